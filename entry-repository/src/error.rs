//! Crate-level error type

use thiserror::Error;

use crate::repository::RepositoryError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside a single repository call
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl Error {
    /// The repository error, if this is one
    pub fn as_repository(&self) -> Option<&RepositoryError> {
        match self {
            Self::Repository(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, RepositoryOperation};

    #[test]
    fn test_repository_error_converts() {
        fn fails() -> Result<()> {
            Err::<(), _>(RepositoryError::validation_failed(RepositoryOperation::Create, "title is required"))?;
            Ok(())
        }

        let error = fails().unwrap_err();
        let inner = error.as_repository().unwrap();
        assert_eq!(inner.kind, RepositoryErrorKind::ValidationFailed);
        assert!(error.to_string().contains("title is required"));
    }

    #[test]
    fn test_figment_error_is_boxed_config_error() {
        let err: Error = figment::Error::from("missing field `per_page`".to_string()).into();
        match &err {
            Error::Config(inner) => assert!(inner.to_string().contains("per_page")),
            Error::Repository(_) | Error::Serialization(_) => panic!("expected a config error"),
        }
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_serde_error_converts() {
        let err: Error = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.as_repository().is_none());
    }
}
