//! Error types for the book club bot

use thiserror::Error;

use crate::club::collection::Rejection;

#[derive(Error, Debug)]
pub enum Error {
    #[error("A {0} is already running in this chat")]
    AlreadyActive(String),

    #[error("Not enough suggestions: {collected} collected, at least 2 required")]
    InsufficientSuggestions { collected: usize },

    #[error("No book club cycle is running in this chat")]
    NoActiveCycle,

    #[error("More than one chat is collecting suggestions")]
    AmbiguousCollection,

    #[error("{0}")]
    Rejected(Rejection),

    #[error("Only club admins can do that")]
    Forbidden,

    #[error("Telegram API error: {0}")]
    Platform(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Error::Platform(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
