pub mod gemini;
pub mod ollama;
pub mod relay;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use relay::RelayClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tuning values forwarded to the provider unchanged. Field names follow the
/// generative-language wire format so the struct can be embedded directly in
/// a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure: provider unreachable, connection reset, etc.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with an error or blocked the response.
    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider answered 200 but the body had no generated text.
    #[error("provider response is missing generated text")]
    MalformedResponse,
}

/// Stateless request/response boundary to a generative-text provider.
///
/// Each call is independent; any multi-turn context is the caller's job to
/// fold into `prompt`.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_serialize_with_provider_field_names() {
        let json = serde_json::to_value(GenerationParams::default()).unwrap();
        assert!((json["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
        assert_eq!(json["topK"], 40);
        assert_eq!(json["maxOutputTokens"], 8192);
        assert_eq!(json["responseMimeType"], "text/plain");
    }

    #[test]
    fn params_deserialize_fills_defaults() {
        let params: GenerationParams = serde_json::from_str(r#"{"temperature": 0.2}"#).unwrap();
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_k, 40);
    }
}
