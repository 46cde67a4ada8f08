//! Client for the Ollama text-generation backend.

pub mod error;

pub use error::{OllamaError, OllamaResult};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the generation backend
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.2:3b".to_string()),
            // Generation on small local models can take a while.
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> OllamaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url,
            model: config.model,
        })
    }

    pub fn with_defaults() -> OllamaResult<Self> {
        Self::new(OllamaConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cheap reachability probe against the model listing endpoint.
    pub async fn health(&self) -> OllamaResult<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OllamaError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Generate text for a prompt.
    pub async fn generate(&self, prompt: &str) -> OllamaResult<String> {
        self.generate_inner(None, prompt).await
    }

    /// Generate text with a system prompt steering the response.
    pub async fn generate_with_system(&self, system: &str, prompt: &str) -> OllamaResult<String> {
        self.generate_inner(Some(system), prompt).await
    }

    async fn generate_inner(&self, system: Option<&str>, prompt: &str) -> OllamaResult<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "requesting generation");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OllamaError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OllamaError::InvalidResponse(e.to_string()))?;

        if body.response.trim().is_empty() {
            return Err(OllamaError::InvalidResponse(
                "model returned empty response".to_string(),
            ));
        }
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_is_non_streaming() {
        let request = GenerateRequest {
            model: "llama3.2:3b",
            prompt: "hello",
            system: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
        assert!(json.get("system").is_none());
    }
}
