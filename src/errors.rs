use thiserror::Error;

#[derive(Error, Debug)]
pub enum AihlError {
    #[error("Missing credential: {field}")]
    Credential { field: &'static str },
    #[error("Login failed: {reason}")]
    Auth { reason: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Parse failed: {reason}")]
    Parse { reason: String },
    #[error("Media descriptor error: {reason}")]
    Media { reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session cache error: {0}")]
    Cache(#[from] serde_json::Error),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
}
