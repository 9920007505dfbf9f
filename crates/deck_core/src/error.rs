use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    /// Missing endpoint or command; nothing was sent.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl DeckError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<reqwest::Error> for DeckError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::MalformedResponse(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}
