use orq_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::{map_call_error, OllamaClient};

// Documents are a dozen short lines; anything longer is cut at a char boundary.
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = truncate_chars(input, MAX_PROMPT_CHARS);

        let url = format!("{}/api/embeddings", self.client.base_url());
        let body = serde_json::to_value(EmbeddingsRequest { model, prompt }).map_err(|e| {
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(self.client.timeout())
            .send_json(body)
            .map_err(|e| {
                map_call_error("AI_EMBEDDINGS_FAILED", "Failed to call embeddings endpoint", e)
            })?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        if v.embedding.is_empty() {
            return Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embeddings response was empty",
            ));
        }
        Ok(v.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
