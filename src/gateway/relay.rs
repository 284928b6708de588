use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionGateway, GatewayError, GenerationParams};

#[derive(Serialize)]
struct RelayRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct RelayResponse {
    text: Option<String>,
    error: Option<String>,
}

/// Client side of the `gemchat serve` relay. Generation parameters live on
/// the relay, so this client only ships the message.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionGateway for RelayClient {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&RelayRequest { message: prompt })
            .send()
            .await?;

        let status = response.status();
        let body: RelayResponse = response
            .json()
            .await
            .map_err(|_| GatewayError::MalformedResponse)?;

        if !status.is_success() {
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| "relay error".to_string()),
            });
        }

        body.text.ok_or(GatewayError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_parses_text() {
        let body: RelayResponse = serde_json::from_str(r#"{"text": "4"}"#).unwrap();
        assert_eq!(body.text.as_deref(), Some("4"));
        assert!(body.error.is_none());
    }

    #[test]
    fn error_body_parses_message() {
        let body: RelayResponse =
            serde_json::from_str(r#"{"error": "something went wrong"}"#).unwrap();
        assert!(body.text.is_none());
        assert_eq!(body.error.as_deref(), Some("something went wrong"));
    }
}
