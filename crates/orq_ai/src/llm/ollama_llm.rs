use orq_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::ollama::{map_call_error, OllamaClient};

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    temperature: f32,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    // Ollama JSON mode; each turn must be one JSON step object.
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("AI_MODEL_CALL_FAILED", "Failed to encode generate request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(self.client.timeout())
            .send_json(body)
            .map_err(|e| map_call_error("AI_MODEL_CALL_FAILED", "Failed to call generate endpoint", e))?;

        let v: GenerateResponse = resp.into_json().map_err(|e| {
            AppError::new("AI_MODEL_CALL_FAILED", "Failed to decode generate response")
                .with_details(e.to_string())
        })?;
        if v.response.trim().is_empty() {
            return Err(AppError::new("AI_MODEL_CALL_FAILED", "Model response was empty")
                .with_retryable(true));
        }
        Ok(v.response)
    }
}
