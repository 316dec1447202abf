use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use orq_core::error::AppError;
use serde::{Deserialize, Serialize};

/// What the synthesizer does when a final answer cites identifiers that were never retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CitationPolicy {
    /// Reject once and let the model try again; strip and flag on the second violation.
    RetryThenFlag,
    /// Strip offending identifiers and flag the answer immediately.
    StripAndFlag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub ollama_base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Sampling temperature for the chat model.
    pub temperature: f32,
    /// Evidence items returned when the caller or the model does not ask for a size.
    pub top_k: usize,
    /// Upper clamp for any requested `k`.
    pub max_top_k: usize,
    /// Retrieval calls the model may make in one session.
    pub max_tool_calls: u32,
    /// Per model/embedding HTTP call.
    pub request_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub citation_policy: CitationPolicy,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "llama3.2:3b".to_string(),
            temperature: 0.0,
            top_k: 10,
            max_top_k: 25,
            max_tool_calls: 4,
            request_timeout_ms: 30_000,
            retry_backoff_ms: 500,
            citation_policy: CitationPolicy::RetryThenFlag,
            snapshot_dir: None,
        }
    }
}

fn invalid(key: &str, value: &str) -> AppError {
    AppError::new("CONFIG_INVALID", "Invalid configuration value")
        .with_details(format!("key={key}; value={value}"))
}

fn parse_env<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), AppError> {
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse::<T>().map_err(|_| invalid(key, &raw))?;
    }
    Ok(())
}

impl EngineConfig {
    /// Read `ORQ_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(&|k: &str| std::env::var(k).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("ORQ_OLLAMA_BASE_URL") {
            cfg.ollama_base_url = v.trim().to_string();
        }
        if let Some(v) = lookup("ORQ_EMBEDDING_MODEL") {
            cfg.embedding_model = v.trim().to_string();
        }
        if let Some(v) = lookup("ORQ_CHAT_MODEL") {
            cfg.chat_model = v.trim().to_string();
        }
        parse_env(lookup, "ORQ_TEMPERATURE", &mut cfg.temperature)?;
        parse_env(lookup, "ORQ_TOP_K", &mut cfg.top_k)?;
        parse_env(lookup, "ORQ_MAX_TOP_K", &mut cfg.max_top_k)?;
        parse_env(lookup, "ORQ_MAX_TOOL_CALLS", &mut cfg.max_tool_calls)?;
        parse_env(lookup, "ORQ_REQUEST_TIMEOUT_MS", &mut cfg.request_timeout_ms)?;
        parse_env(lookup, "ORQ_RETRY_BACKOFF_MS", &mut cfg.retry_backoff_ms)?;

        if let Some(v) = lookup("ORQ_CITATION_POLICY") {
            cfg.citation_policy = match v.trim() {
                "retry_then_flag" => CitationPolicy::RetryThenFlag,
                "strip_and_flag" => CitationPolicy::StripAndFlag,
                other => return Err(invalid("ORQ_CITATION_POLICY", other)),
            };
        }
        if let Some(v) = lookup("ORQ_SNAPSHOT_DIR") {
            let v = v.trim();
            cfg.snapshot_dir = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let cfg: Self = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to decode config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.embedding_model.trim().is_empty() {
            return Err(invalid("embedding_model", ""));
        }
        if self.chat_model.trim().is_empty() {
            return Err(invalid("chat_model", ""));
        }
        if self.top_k == 0 || self.max_top_k == 0 || self.top_k > self.max_top_k {
            return Err(AppError::new("CONFIG_INVALID", "top_k must be within 1..=max_top_k")
                .with_details(format!("top_k={}; max_top_k={}", self.top_k, self.max_top_k)));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", &self.temperature.to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Clamp a requested evidence size into `1..=max_top_k`, defaulting to `top_k`.
    pub fn clamp_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.top_k).clamp(1, self.max_top_k)
    }
}
