use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionGateway, GatewayError, GenerationParams};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: &'a GenerationParams,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// First text part of the first candidate, if the provider produced one.
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
    }
}

/// Client for the Google Generative Language API.
///
/// The key is supplied by the caller (environment variable or config file),
/// never baked into the binary.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-2.0-flash-exp".to_string(),
            "gemini-1.5-pro".to_string(),
            "gemini-1.5-flash".to_string(),
            "gemini-1.5-flash-8b".to_string(),
        ]
    }
}

#[async_trait]
impl CompletionGateway for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GatewayError> {
        // Key goes in a header, not the URL: transport errors render the
        // URL verbatim and end up in the transcript and the relay log.
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: params,
        };

        debug!(model = %self.model, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider { status, message });
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|_| GatewayError::MalformedResponse)?;

        body.into_text().ok_or(GatewayError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_first_candidate() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "hello there"}]}}
            ]
        }"#;
        let response: GeminiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text().as_deref(), Some("hello there"));
    }

    #[test]
    fn blocked_response_without_candidates_yields_none() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let response: GeminiResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_text().is_none());
    }

    #[test]
    fn candidate_without_parts_yields_none() {
        let body = r#"{"candidates": [{"content": {"parts": []}}]}"#;
        let response: GeminiResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_text().is_none());
    }

    #[tokio::test]
    async fn transport_error_text_never_contains_the_key() {
        let mut client = GeminiClient::new("SECRET-KEY-123", "gemini-2.0-flash-exp");
        // Nothing listens on port 1; the send fails at the transport level
        // and the error carries the request URL.
        client.base_url = "http://127.0.0.1:1".to_string();

        let err = client
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap_err();

        let rendered = err.to_string();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(!rendered.contains("SECRET-KEY-123"));
    }

    #[test]
    fn request_body_embeds_generation_config() {
        let params = GenerationParams::default();
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: "2+2?" }],
            }],
            generation_config: &params,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "2+2?");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }
}
