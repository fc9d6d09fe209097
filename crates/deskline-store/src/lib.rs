//! Persistence layer for deskline
//!
//! Provides:
//! - Tickets and agent replies
//! - Menu, media folder and page hierarchies with transactional reordering
//! - Templates and redirects
//! - Audit log (append-only)
//! - Notification outbox

mod audit;
mod content;
mod sqlite;
mod tickets;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use deskline_util::{DeskError, HierarchyError};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A write would break a uniqueness or ownership rule
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Deletion blocked by rows that still reference the target
    #[error("{entity} is still used by {count} {referrer}")]
    InUse {
        entity: String,
        count: usize,
        referrer: &'static str,
    },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DeskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => DeskError::NotFound(what),
            StoreError::Conflict(msg) => DeskError::Conflict(msg),
            in_use @ StoreError::InUse { .. } => DeskError::Conflict(in_use.to_string()),
            StoreError::Hierarchy(err) => DeskError::Hierarchy(err),
            other => DeskError::StoreError(other.to_string()),
        }
    }
}
