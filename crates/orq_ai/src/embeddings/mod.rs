use orq_core::error::AppError;

/// Computes a fixed-length vector for a text. Implementations must be deterministic per
/// `(model, input)` and safe to call from several threads at once.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod hashing;
pub mod ollama_embed;

pub use hashing::HashingEmbedder;
pub use ollama_embed::OllamaEmbedder;
