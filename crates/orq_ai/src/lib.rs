pub mod answer;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod engine;
pub mod guardrails;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod retrieve;
