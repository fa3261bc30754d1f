use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed ids, empty text, a sender outside the conversation.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("please log in")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row no longer parses into its domain type.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl ChatError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
