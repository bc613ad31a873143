//! Error types for the logging subsystem

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// `[logging] level` or `--log-level` named something other than trace..error
    UnknownLevel(String),
    /// The subscriber could not be installed, usually because one already is
    Install(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::UnknownLevel(level) => {
                write!(f, "unknown log level '{}' (expected trace, debug, info, warn or error)", level)
            }
            LoggingError::Install(msg) => write!(f, "failed to install log subscriber: {}", msg),
        }
    }
}

impl std::error::Error for LoggingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err: LoggingError = "noisy".parse::<super::super::LogLevel>().unwrap_err();
        assert_eq!(err, LoggingError::UnknownLevel("noisy".to_string()));
        assert!(err.to_string().starts_with("unknown log level 'noisy'"));
    }
}
