//! Error type shared by the cache, the loader and the service adapters.

use std::time::Duration;

use thiserror::Error;

use crate::remote::ValidationDetail;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The service answered with `success: false`.
    #[error("{}", remote_message(.message, .details))]
    Remote { message: String, details: Vec<ValidationDetail> },

    /// The call itself failed before an answer arrived.
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A success envelope without the record the operation needs.
    #[error("service returned no {0} record")]
    MissingData(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn remote(message: impl Into<String>) -> Self {
        Error::Remote { message: message.into(), details: Vec::new() }
    }

    /// Validation failures carry per-field details.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Remote { details, .. } if !details.is_empty())
    }

    /// Transport failures and timeouts; worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_))
    }
}

fn remote_message(message: &str, details: &[ValidationDetail]) -> String {
    if details.is_empty() {
        return message.to_string();
    }
    let joined: Vec<String> = details.iter().map(ToString::to_string).collect();
    format!("{message} ({})", joined.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_join_details() {
        let err = Error::Remote {
            message: "Validation failed".into(),
            details: vec![
                ValidationDetail { field: Some("boardId".into()), message: "is required".into() },
                ValidationDetail { field: None, message: "name too long".into() },
            ],
        };
        assert_eq!(err.to_string(), "Validation failed (boardId: is required; name too long)");
        assert!(err.is_validation());
        assert!(!err.is_transient());
    }

    #[test]
    fn plain_remote_error_is_just_the_message() {
        assert_eq!(Error::remote("boardId invalid").to_string(), "boardId invalid");
        assert!(Error::Timeout(Duration::from_millis(250)).to_string().contains("250ms"));
    }
}
