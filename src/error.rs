use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("io operation failed: {0}")]
    IOFailed(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(toml::de::Error),
    #[error("invalid conversation file: {0}")]
    InvalidConversation(serde_json::Error),
    #[error("malformed oracle output: {0}")]
    MalformedOutput(serde_json::Error),
    #[error("oracle returned an empty completion")]
    EmptyCompletion,
    #[error("oracle failed: {0}")]
    OracleFailed(String),
}
