pub mod demo;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod normalize;

#[cfg(test)]
mod tests {
    use super::error::AppError;

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("AI_TEST", "index failed")
            .with_details("chunk=1")
            .with_retryable(true);
        assert_eq!(err.code, "AI_TEST");
        assert_eq!(err.message, "index failed");
        assert!(err.retryable);
        assert_eq!(err.to_string(), "[AI_TEST] index failed (chunk=1)");
    }
}
