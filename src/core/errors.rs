use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),
}

impl ClientError {
    /// The request never left, or no response ever came back.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// A response arrived but its payload could not be processed.
    ///
    /// Callers use this to decide whether a failure is worth retrying at a
    /// higher level: processing errors are deterministic, transport errors
    /// may not be.
    pub fn is_processing_error(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Api { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigError;

    #[test]
    fn test_error_classification() {
        assert!(ClientError::Transport("refused".to_string()).is_transport());
        assert!(!ClientError::Transport("refused".to_string()).is_processing_error());
        assert!(ClientError::Serialization("bad json".to_string()).is_processing_error());
        assert!(ClientError::Api {
            status: 404,
            message: "missing".to_string()
        }
        .is_processing_error());

        let from_config: ClientError =
            ConfigError::MissingEnvironmentVariable("X_BASE_URI".to_string()).into();
        assert!(from_config.is_configuration());
    }

    #[test]
    fn test_json_errors_are_serialization_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ClientError = err.into();
        assert!(err.is_serialization());
    }
}
