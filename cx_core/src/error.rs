/// Core error type for codionix
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict on {}", fields.join(", "))]
    Conflict { fields: Vec<String> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database timeout: {0}")]
    DatabaseTimeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Conflict error naming the offending unique field(s)
    pub fn conflict(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Error::Conflict {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this error is expected and recoverable by the caller.
    /// Expected errors are never logged above warning severity.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::Conflict { .. }
                | Error::Unauthorized(_)
                | Error::Forbidden(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
