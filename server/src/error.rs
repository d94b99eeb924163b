use crate::battle::BattleError;
use crate::grid::GridError;
use shared::ProtocolError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication failed for '{username}': {reason}")]
    Auth { username: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error in {path}: {reason}")]
    Data { path: PathBuf, reason: String },

    #[error("battle rejected: {0}")]
    Battle(#[from] BattleError),

    #[error("grid rejected: {0}")]
    Grid(#[from] GridError),
}

impl ServerError {
    pub fn auth(username: &str, reason: impl Into<String>) -> Self {
        ServerError::Auth {
            username: username.to_string(),
            reason: reason.into(),
        }
    }

    pub fn data(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ServerError::Data {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Data errors mean a broken file on disk rather than a bad request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Data { .. })
    }
}
