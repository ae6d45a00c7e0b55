use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Malformed control frame: {0}")]
    MalformedFrame(String),

    #[error("Engine output channel closed before readiness")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IpcError>;
