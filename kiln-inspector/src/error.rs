use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectorError {
    #[error("Listing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid debugger URL: {0}")]
    BadUrl(#[from] url::ParseError),

    #[error("Debugger URL rejected username rewrite: {0}")]
    Rewrite(String),
}

pub type Result<T> = std::result::Result<T, InspectorError>;
