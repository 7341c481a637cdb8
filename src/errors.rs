//! Error types for the uptime tracker

use std::fmt;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug)]
pub enum TrackerError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// Key-value store rejected a read or write
    Storage(String),

    /// Upstream fetch returned something unusable
    Fetch(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Io(err) => write!(f, "IO error: {}", err),
            TrackerError::Http(err) => write!(f, "HTTP error: {}", err),
            TrackerError::Json(err) => write!(f, "JSON error: {}", err),
            TrackerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TrackerError::Storage(msg) => write!(f, "Storage error: {}", msg),
            TrackerError::Fetch(msg) => write!(f, "Fetch error: {}", msg),
            TrackerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Io(err) => Some(err),
            TrackerError::Http(err) => Some(err),
            TrackerError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io(err)
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Http(err)
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let err = TrackerError::Storage("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Storage error: quota exceeded");

        let err = TrackerError::Config("per_page must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: per_page must be greater than 0"
        );
    }

    #[test]
    fn test_source_is_preserved() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TrackerError::from(json_err);
        assert!(err.source().is_some());
        assert!(TrackerError::Other("x".to_string()).source().is_none());
    }
}
