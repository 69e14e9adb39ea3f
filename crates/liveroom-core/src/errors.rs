use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("directory error: {0}")]
    Directory(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("only the host can {0}")]
    NotHost(&'static str),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("room screen is closed")]
    Closed,
}
