use std::io;

use crate::message::MessageId;

/// Errors reported synchronously to the caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),

    #[error("adapter supports neither fetch nor stream transfer")]
    InvalidAdapter,

    #[error("cannot send an empty prompt")]
    EmptyPrompt,

    #[error("reply {0} is still in progress")]
    ReplyInProgress(MessageId),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure signaled by a message's producer. Ends the message in the
/// error state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("producer went away before finishing")]
    Dropped,
}

impl From<String> for SourceError {
    fn from(s: String) -> Self {
        SourceError::Adapter(s)
    }
}

impl From<&str> for SourceError {
    fn from(s: &str) -> Self {
        SourceError::Adapter(s.to_owned())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
