// Error types for the Girder action pipeline

use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A filter, result or action broke the pipeline protocol.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Every configuration problem found in one pass, reported together.
    #[error("Configuration error: {}", .0.join("; "))]
    Configuration(Vec<String>),

    #[error("Ambiguous action: {0}")]
    AmbiguousAction(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Model binding error: {0}")]
    ModelBinding(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // HTTP flavored errors raised by application code
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Any error raised by user code, kept intact for exception filters.
    #[error("{0}")]
    Application(Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an arbitrary application error.
    pub fn application<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Application(Box::new(error))
    }

    /// Downcast a wrapped application error to its concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Application(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Collapse a list of configuration problems into a result.
    pub fn from_configuration_errors(errors: Vec<String>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(errors))
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ActionNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::ModelBinding(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // Default to 500 for unmapped errors
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}
