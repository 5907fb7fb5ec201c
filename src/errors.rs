use uuid::Uuid;

/// Centralized error types for the learning-state engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("flashcard not found: {0}")]
    CardNotFound(Uuid),

    #[error("invalid review outcome code: {0} (expected 1 = Again or 3 = Good)")]
    InvalidOutcome(i32),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("generation service error: {0}")]
    Generation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("mutation attempted from within a subscriber notification")]
    ReentrantMutation,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether the error is local to a single request and leaves the
    /// store untouched.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        let err = EngineError::CardNotFound(id);
        assert!(err.to_string().contains("flashcard not found"));

        let err = EngineError::InvalidOutcome(2);
        assert!(err.to_string().contains("2"));
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::Validation("empty batch".into()).is_recoverable());
        assert!(EngineError::Generation("timeout".into()).is_recoverable());
        assert!(!EngineError::Persistence(anyhow::anyhow!("disk full")).is_recoverable());
    }
}
