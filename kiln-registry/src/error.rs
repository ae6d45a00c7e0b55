use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid registry URL: {0}")]
    BadUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
