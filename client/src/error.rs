use reqwest::StatusCode;
use thiserror::Error;
use validator::ValidationErrors;

use crate::server::Capability;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("{0} is not supported by this server")]
    Unsupported(Capability),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServerError {
    pub fn book_not_found(id: &str) -> Self {
        ServerError::NotFound(format!("Book with id {id} not exists"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServerError::NotFound(_))
    }
}
