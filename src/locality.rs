use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{LocalityRecord, LookupRequest, LookupResponse};
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

/// Resolves a place name to its rating and description. Stateless per call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LocalityLookup: Send + Sync {
    async fn lookup(&self, locality: &str) -> Result<LocalityRecord>;
}

pub struct HttpLocalityLookup {
    tx: Arc<dyn Transport>,
    url: String,
}

impl HttpLocalityLookup {
    pub fn new(tx: Arc<dyn Transport>, url: String) -> Self {
        Self { tx, url }
    }
}

#[async_trait]
impl LocalityLookup for HttpLocalityLookup {
    async fn lookup(&self, locality: &str) -> Result<LocalityRecord> {
        tracing::info!("Looking up locality: {}", locality);

        let request = LookupRequest {
            locality: locality.to_string(),
        };
        let body = serde_json::to_value(&request)?;
        let value = self.tx.post_json(&self.url, &body).await?;
        let response: LookupResponse = serde_json::from_value(value)?;

        Ok(response.into_record(locality))
    }
}
