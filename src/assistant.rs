use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{AskRequest, AskResponse};
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

/// Answers a free-text question. The question is not scoped to any locality.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}

pub struct HttpAssistant {
    tx: Arc<dyn Transport>,
    url: String,
}

impl HttpAssistant {
    pub fn new(tx: Arc<dyn Transport>, url: String) -> Self {
        Self { tx, url }
    }
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn ask(&self, question: &str) -> Result<String> {
        tracing::info!("Asking assistant: {}", question);

        let body = serde_json::to_value(AskRequest {
            question: question.to_string(),
        })?;
        let value = self.tx.post_json(&self.url, &body).await?;
        let response: AskResponse = serde_json::from_value(value)?;

        Ok(response.answer)
    }
}
