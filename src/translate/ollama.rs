use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{ProviderFailure, TranslationProvider, TranslationRequest};
use crate::config::TranslateConfig;
use crate::error::{Result, SeasonSubError};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Translation provider backed by an Ollama server's `/api/generate`.
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

fn classify(status: StatusCode, body: &str) -> ProviderFailure {
    let message = format!("Ollama API error {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::SERVICE_UNAVAILABLE
        || body.contains("RESOURCE_EXHAUSTED")
    {
        ProviderFailure::Throttled(message)
    } else {
        ProviderFailure::Failed(message)
    }
}

#[async_trait]
impl TranslationProvider for OllamaProvider {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<String, ProviderFailure> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": self.model,
            "prompt": request.render_prompt(),
            "stream": false,
        });

        debug!("Sending {} lines to {}", request.expected_lines(), url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderFailure::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderFailure::Failed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify(status, &text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderFailure::Failed(format!("Unexpected response format: {}", e)))?;
        Ok(parsed.response)
    }
}

/// Check that the Ollama server answers and has the model pulled.
pub async fn check_provider_availability(endpoint: &str, model: &str) -> Result<()> {
    let client = Client::new();
    let url = format!("{}/api/show", endpoint.trim_end_matches('/'));

    let response = client
        .post(&url)
        .json(&json!({ "name": model }))
        .send()
        .await
        .map_err(|e| {
            SeasonSubError::ProviderUnavailable(format!("Failed to connect to Ollama: {}", e))
        })?;

    if response.status().is_success() {
        info!("Ollama model '{}' is available", model);
        Ok(())
    } else {
        Err(SeasonSubError::ProviderUnavailable(format!(
            "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
            model, model
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn throttling_statuses_are_retryable() {
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, "").is_throttled());
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, "busy").is_throttled());
        let body = "{\"error\":\"RESOURCE_EXHAUSTED\"}";
        assert!(classify(StatusCode::BAD_REQUEST, body).is_throttled());
        assert!(!classify(StatusCode::NOT_FOUND, "model not found").is_throttled());
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let mut config = Config::default().translate;
        config.endpoint = "http://localhost:11434/".to_string();

        let provider = OllamaProvider::new(&config).unwrap();

        assert_eq!(provider.endpoint, "http://localhost:11434");
        assert_eq!(provider.model, config.model);
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_as_unavailable() {
        let result = check_provider_availability("http://127.0.0.1:1", "llama3.2:3b").await;
        assert!(matches!(result, Err(SeasonSubError::ProviderUnavailable(_))));
    }
}
