use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Could not connect after {attempts} attempts: {reason}")]
    ConnectFailed { attempts: u32, reason: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Reducer(#[from] crate::reducer::ReducerError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
