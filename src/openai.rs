//! Minimal OpenAI-compatible HTTP client shared by the embedder and the
//! completion model.
//!
//! Requests are JSON `POST`s authenticated with `OPENAI_API_KEY`. HTTP 429,
//! 5xx, and network errors are retried with exponential backoff (1s, 2s,
//! 4s, ... capped at 32s); any other 4xx fails immediately.

use anyhow::{bail, Result};
use std::time::Duration;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    max_retries: u32,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_base", &self.api_base)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    /// Build a client reading the API key from the environment.
    pub fn from_env(api_base: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let api_key = match std::env::var(API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", API_KEY_VAR),
        };
        Self::new(api_base, api_key, timeout_secs, max_retries)
    }

    pub fn new(
        api_base: &str,
        api_key: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// POST `body` to `{api_base}/{path}` and return the decoded JSON.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = self.endpoint(path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(%url, attempt, ?delay, "retrying OpenAI request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable(status) {
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OpenAI request failed after retries")))
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        let client =
            OpenAIClient::new("https://api.openai.com/v1/", "sk-test".into(), 5, 0).unwrap();
        assert_eq!(
            client.endpoint("/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            client.endpoint("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn debug_hides_key() {
        let client = OpenAIClient::new("http://localhost", "sk-secret".into(), 5, 0).unwrap();
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }

    #[test]
    fn retry_classification() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
    }
}
