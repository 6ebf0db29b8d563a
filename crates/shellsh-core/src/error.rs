//! Error types for shellsh.

use thiserror::Error;

/// Main error type for shellsh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The pseudo-terminal or the shell process could not be started
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Session was closed, or its shell process has exited
    #[error("Session already terminated")]
    SessionTerminated,

    /// PTY plumbing failure after a successful spawn
    #[error("PTY error: {0}")]
    Pty(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error() {
        let err = Error::Spawn("no such file".to_string());
        assert_eq!(err.to_string(), "Spawn error: no such file");
    }

    #[test]
    fn test_session_terminated_error() {
        let err = Error::SessionTerminated;
        assert_eq!(err.to_string(), "Session already terminated");
    }

    #[test]
    fn test_pty_error() {
        let err = Error::Pty("writer already released".to_string());
        assert_eq!(err.to_string(), "PTY error: writer already released");
    }

    #[test]
    fn test_config_error() {
        let err = Error::Config("terminal.rows must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: terminal.rows must be > 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_error_debug() {
        let err = Error::SessionTerminated;
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("SessionTerminated"));
    }
}
