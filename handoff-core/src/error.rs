use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Session not found or expired")]
    NotFound,

    #[error("Failed to generate unique session code after {attempts} attempts")]
    CollisionExhausted { attempts: usize },

    #[error("Database error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl HandoffError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        HandoffError::InvalidInput(msg.into())
    }

    /// Postgres SQLSTATE of the underlying failure, if there is one.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            HandoffError::Backend(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// True for failures the caller caused (bad input, unknown session).
    pub fn is_client_error(&self) -> bool {
        matches!(self, HandoffError::InvalidInput(_) | HandoffError::NotFound)
    }
}
