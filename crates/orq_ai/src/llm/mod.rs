use orq_core::error::AppError;

/// One completion round-trip against an external language model.
///
/// The synthesizer drives the tool loop on top of this: each call is a single model turn,
/// and each implementation applies its own per-call timeout.
pub trait Llm: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_llm;

pub use ollama_llm::OllamaLlm;
