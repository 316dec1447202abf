#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use orq_ai::embeddings::Embedder;
use orq_ai::llm::Llm;
use orq_core::error::AppError;

/// Concept-bucket embedder: one dimension per keyword family plus a constant bias, so
/// semantic queries ("discount code") land on documents that never use those words.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

const FAMILIES: [&[&str]; 4] = [
    &["coupon", "discount", "voucher"],
    &["refund", "refunded"],
    &["vip"],
    &["gift"],
];

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = input.to_ascii_lowercase();
        let mut v = vec![0.2_f32];
        for family in FAMILIES {
            let hit = family.iter().any(|w| lower.contains(w));
            v.push(if hit { 1.0 } else { 0.0 });
        }
        Ok(v)
    }
}

/// Fails for any input mentioning one of `poisoned`; otherwise delegates.
pub struct FlakyEmbedder<E> {
    pub inner: E,
    pub poisoned: Vec<String>,
    pub retryable: bool,
}

impl<E: Embedder> Embedder for FlakyEmbedder<E> {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        if self.poisoned.iter().any(|p| input.contains(p.as_str())) {
            return Err(AppError::new("AI_EMBEDDINGS_FAILED", "stub embedder refused input")
                .with_retryable(self.retryable));
        }
        self.inner.embed(model, input)
    }
}

/// Plays back canned replies in order and records every prompt it was sent.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, AppError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, AppError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Llm for ScriptedLlm {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::new("AI_MODEL_CALL_FAILED", "script exhausted")))
    }
}

pub fn tool_call(query: &str, k: usize) -> String {
    format!(r#"{{"step":"tool_call","query":"{query}","k":{k}}}"#)
}

pub fn final_answer(answer: &str, ids: &[&str], confidence: f64) -> String {
    let ids = ids
        .iter()
        .map(|i| format!("\"{i}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"step":"final_answer","answer":"{answer}","used_record_ids":[{ids}],"confidence":{confidence}}}"#
    )
}

pub fn retryable_failure() -> AppError {
    AppError::new("AI_MODEL_CALL_FAILED", "Model call failed")
        .with_details("status=503")
        .with_retryable(true)
}
