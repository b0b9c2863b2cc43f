use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{Result, SpotOnError};
use crate::retry::RetryPolicy;

/// JSON-over-HTTP seam shared by the locality, assistant and geocoder adapters.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sent exactly once. A POST may have side effects on the service.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
    /// Idempotent; retried under the configured policy.
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value>;
}

pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, retry })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.http_timeout(),
            &cfg.services.user_agent,
            RetryPolicy::ExponentialBackoff(cfg.http.retry.clone()),
        )
    }

    async fn read_json(url: &str, response: Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| {
                SpotOnError::network(url, Some(status.as_u16()), format!("invalid JSON body: {e}"))
            });
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(SpotOnError::network(url, Some(status.as_u16()), body))
    }

    /// Runs `send` until it succeeds, fails permanently, or attempts run out.
    async fn with_retry<F, Fut>(&self, url: &str, policy: &RetryPolicy, send: F) -> Result<Value>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = std::result::Result<Response, reqwest::Error>> + Send,
    {
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match send().await {
                Ok(response) => Self::read_json(url, response).await,
                Err(e) => Err(SpotOnError::network(url, None, e.to_string())),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_transient() => {
                    let delay = policy.delay(attempt);
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {} - retrying in {:?}",
                        url,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("Request to {} failed after {} attempt(s): {}", url, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        tracing::debug!("POST {}", url);
        self.with_retry(url, &RetryPolicy::Never, || {
            self.client.post(url).json(body).send()
        })
        .await
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("GET {} {:?}", url, query);
        self.with_retry(url, &self.retry, || self.client.get(url).query(query).send())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::assistant::{Assistant, HttpAssistant};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response per accepted connection, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("listener has an address");
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    /// Accepts connections, counts them and never answers.
    async fn serve_silently() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("listener has an address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (format!("http://{addr}"), accepted)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::ExponentialBackoff(crate::config::RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_base: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let url = serve(vec![(200, r#"{"answer":"ok"}"#)]).await;
        let transport = HttpTransport::new(Duration::from_secs(5), "test", RetryPolicy::Never)
            .expect("client should build");
        let value = transport
            .post_json(&url, &json!({"question": "hi"}))
            .await
            .expect("request should succeed");
        assert_eq!(value, json!({"answer": "ok"}));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let url = serve(vec![(503, r#"{}"#), (200, r#"[1]"#)]).await;
        let transport = HttpTransport::new(Duration::from_secs(5), "test", fast_retry(3))
            .expect("client should build");
        let value = transport.get_json(&url, &[("q", "x")]).await.unwrap();
        assert_eq!(value, json!([1]));
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let url = serve(vec![(404, r#"{"error":"nope"}"#), (200, r#"{}"#)]).await;
        let transport = HttpTransport::new(Duration::from_secs(5), "test", fast_retry(3))
            .expect("client should build");
        let err = transport.post_json(&url, &json!({})).await.unwrap_err();
        match err {
            SpotOnError::Network { status, .. } => assert_eq!(status, Some(404)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_is_not_retried_on_server_error() {
        let url = serve(vec![(503, r#"{}"#), (200, r#"{"answer":"late"}"#)]).await;
        let transport = HttpTransport::new(Duration::from_secs(5), "test", fast_retry(3))
            .expect("client should build");
        let err = transport.post_json(&url, &json!({})).await.unwrap_err();
        match err {
            SpotOnError::Network { status, .. } => assert_eq!(status, Some(503)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timed_out_question_is_posted_once() {
        let (url, accepted) = serve_silently().await;
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::new(Duration::from_millis(200), "test", fast_retry(3))
                .expect("client should build"),
        );
        let assistant = HttpAssistant::new(transport, url);

        let result = assistant.ask("How is traffic here?").await;

        assert!(result.is_err());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_transient_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let transport = HttpTransport::new(Duration::from_secs(5), "test", RetryPolicy::Never)
            .expect("client should build");

        let err = transport.get_json(&url, &[("q", "x")]).await.unwrap_err();

        assert!(matches!(err, SpotOnError::Network { status: None, .. }));
        assert!(err.is_transient());
    }
}
