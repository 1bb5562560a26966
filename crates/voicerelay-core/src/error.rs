use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed or missing caller input (no upload, empty audio).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any failure reported by, or on the way to, the remote provider.
    #[error("{0}")]
    RemoteService(String),

    #[error("Config error: {0}")]
    StartupConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let e = RelayError::InvalidInput("No audio data provided".into());
        assert_eq!(e.to_string(), "Invalid input: No audio data provided");

        let e = RelayError::RemoteService("Incorrect API key provided".into());
        assert_eq!(e.to_string(), "Incorrect API key provided");

        let e = RelayError::StartupConfig("api_key is required".into());
        assert_eq!(e.to_string(), "Config error: api_key is required");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let e: RelayError = io_err.into();
        assert!(e.to_string().contains("not found"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{invalid").unwrap_err();
        let e: RelayError = json_err.into();
        assert!(e.to_string().contains("JSON error"));
    }

    #[test]
    fn test_only_invalid_input_is_client_error() {
        assert!(RelayError::InvalidInput("x".into()).is_client_error());
        assert!(!RelayError::RemoteService("x".into()).is_client_error());
        assert!(!RelayError::StartupConfig("x".into()).is_client_error());
    }
}
