use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionGateway, GatewayError, GenerationParams};

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

impl From<&GenerationParams> for OllamaOptions {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            num_predict: params.max_output_tokens,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Client for a local Ollama server. No API key involved.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider {
                status: response.status().as_u16(),
                message: "failed to list models".to_string(),
            });
        }

        let models_response: OllamaModelsResponse = response
            .json()
            .await
            .map_err(|_| GatewayError::MalformedResponse)?;

        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl CompletionGateway for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: params.into(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message =
                "Ollama request failed. Make sure Ollama is running with: ollama serve".to_string();
            return Err(GatewayError::Provider { status, message });
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|_| GatewayError::MalformedResponse)?;

        body.response.ok_or(GatewayError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_params_through() {
        let params = GenerationParams {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 20,
            max_output_tokens: 512,
            response_mime_type: "text/plain".to_string(),
        };
        let options = OllamaOptions::from(&params);
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.num_predict, 512);
    }

    #[test]
    fn missing_response_field_is_detected() {
        let body: OllamaResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(body.response.is_none());
    }
}
