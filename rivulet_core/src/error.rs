//! Unified error handling for RIVULET
//!
//! Runtime operations (`emit`, `on_next`, `request`) never fail: they degrade
//! by dropping data and report through the `log` facade. This error type only
//! covers setup-time failures such as configuration, wiring and task spawning.

use thiserror::Error;

/// Main error type for RIVULET setup operations
#[derive(Debug, Error)]
pub enum RivuletError {
    /// I/O related errors (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded buffer or queue was asked for zero slots
    #[error("Invalid capacity for {what}: {capacity}")]
    InvalidCapacity { what: String, capacity: usize },

    /// A timer may only be polled by one scheduler
    #[error("Timer {timer} is already owned by scheduler {owner}")]
    TimerAlreadyOwned { timer: u32, owner: u64 },

    /// A cross-context object was bound to a second task
    #[error("Already bound to a task: {0}")]
    AlreadyBound(String),

    /// Task thread creation failed
    #[error("Failed to spawn task: {0}")]
    Spawn(String),

    /// Invalid input/argument errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Catch-all for other error types
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RivuletError
pub type RivuletResult<T> = Result<T, RivuletError>;

impl From<toml::de::Error> for RivuletError {
    fn from(err: toml::de::Error) -> Self {
        RivuletError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<&str> for RivuletError {
    fn from(msg: &str) -> Self {
        RivuletError::Other(msg.to_string())
    }
}

impl From<String> for RivuletError {
    fn from(msg: String) -> Self {
        RivuletError::Other(msg)
    }
}

// Helper methods
impl RivuletError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RivuletError::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        RivuletError::InvalidInput(msg.into())
    }

    /// Create an invalid capacity error for the named buffer
    pub fn invalid_capacity<S: Into<String>>(what: S, capacity: usize) -> Self {
        RivuletError::InvalidCapacity {
            what: what.into(),
            capacity,
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, RivuletError::Config(_))
    }

    /// Check if this is an ownership conflict between schedulers
    pub fn is_ownership_conflict(&self) -> bool {
        matches!(
            self,
            RivuletError::TimerAlreadyOwned { .. } | RivuletError::AlreadyBound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RivuletError::invalid_capacity("AsyncFlow 'captures'", 0);
        assert_eq!(
            err.to_string(),
            "Invalid capacity for AsyncFlow 'captures': 0"
        );

        let err = RivuletError::TimerAlreadyOwned { timer: 3, owner: 7 };
        assert_eq!(err.to_string(), "Timer 3 is already owned by scheduler 7");
    }

    #[test]
    fn test_error_from_str() {
        let err: RivuletError = "boom".into();
        assert!(matches!(err, RivuletError::Other(ref m) if m == "boom"));
    }

    #[test]
    fn test_error_from_toml() {
        let parsed: Result<toml::Value, _> = toml::from_str("queue_depth = ");
        let err: RivuletError = parsed.unwrap_err().into();
        assert!(err.is_config());
    }

    #[test]
    fn test_ownership_conflict_helper() {
        assert!(RivuletError::AlreadyBound("captures".into()).is_ownership_conflict());
        assert!(!RivuletError::config("bad").is_ownership_conflict());
    }
}
