//! Ollama-compatible HTTP text generation.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TextGenerator;
use crate::error::LlmError;
use crate::models::config::LlmConfig;

/// Calls `POST {endpoint}/api/generate` on an Ollama-compatible server.
///
/// Requests are bounded by the configured timeout; a stuck model surfaces as
/// [`LlmError::Generation`] instead of blocking the run forever.
pub struct HttpGenerator {
    client: Client,
    url: String,
    model: String,
    max_new_tokens: u32,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpGenerator {
    /// Build a generator from configuration. The API key, if any, is read
    /// from the environment variable named in `api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Generation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/api/generate", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            max_new_tokens: config.max_new_tokens,
            api_key,
        })
    }

    /// Full URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            // Greedy decoding
            options: GenerateOptions {
                num_predict: self.max_new_tokens,
                temperature: 0.0,
            },
        }
    }
}

impl TextGenerator for HttpGenerator {
    fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        debug!("POST {} (model {})", self.url, self.model);

        let mut request = self.client.post(&self.url).json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| LlmError::Generation(format!("failed to call model endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Generation(format!(
                "model endpoint returned {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|e| LlmError::Generation(format!("failed to parse response: {}", e)))?;

        debug!("Model returned {} chars", body.response.len());
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> LlmConfig {
        LlmConfig {
            endpoint: endpoint.to_string(),
            timeout_secs: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_and_request_body() {
        let generator = HttpGenerator::new(&config("http://localhost:11434/"), None).unwrap();
        assert_eq!(generator.url(), "http://localhost:11434/api/generate");

        let body = serde_json::to_value(generator.request_body("hello")).unwrap();
        assert_eq!(body["model"], "smollm2:360m");
        assert_eq!(body["prompt"], "hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 512);
    }

    #[test]
    fn test_unreachable_endpoint_is_generation_error() {
        let generator = HttpGenerator::new(&config("http://127.0.0.1:1"), None).unwrap();
        assert!(matches!(
            generator.generate("hello"),
            Err(LlmError::Generation(_))
        ));
    }
}
