use std::time::Duration;

use orq_core::error::AppError;

const LOCAL_PREFIX: &str = "http://127.0.0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    timeout: Duration,
}

fn remote_not_allowed(base_url: &str) -> AppError {
    AppError::new(
        "AI_REMOTE_NOT_ALLOWED",
        "Ollama base URL must be localhost (127.0.0.1)",
    )
    .with_details(format!("base_url={base_url}"))
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    ///
    /// Accepted shapes: `http://127.0.0.1` and `http://127.0.0.1:<port>` (port 1..=65535),
    /// optionally with one trailing slash.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let rest = base_url
            .strip_prefix(LOCAL_PREFIX)
            .ok_or_else(|| remote_not_allowed(&base_url))?;
        if !rest.is_empty() {
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| remote_not_allowed(&base_url))?;
            let valid_port = !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p));
            if !valid_port {
                return Err(remote_not_allowed(&base_url));
            }
        }

        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-call timeout applied to every request made through this client.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(Duration::from_millis(800))
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("AI_OLLAMA_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::new(
                "AI_OLLAMA_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }
}

/// Map a ureq failure into a structured error. Transport failures and 5xx/429 are retryable.
pub(crate) fn map_call_error(code: &str, message: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, _) => AppError::new(code, message)
            .with_details(format!("status={status}"))
            .with_retryable(status >= 500 || status == 429),
        ureq::Error::Transport(t) => AppError::new(code, message)
            .with_details(t.to_string())
            .with_retryable(true),
    }
}
