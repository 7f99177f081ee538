//! Error types for the guided dialogue domain

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the dialogue engine and its collaborators
#[derive(Debug, Error)]
pub enum DomainError {
    /// The external user profile lacked a field we require to create an account
    #[error("profile for external user {external_user_id} is missing {field}")]
    MissingProfileField {
        external_user_id: String,
        field: &'static str,
    },

    /// The authored dialogue data has no edge for the given input.
    /// The conversation stays at the same node until the author fixes the data.
    #[error("node {node_id} has no transition for input '{input}'")]
    UnknownTransition { node_id: String, input: String },

    /// A transition referenced a node id that is not in the store
    #[error("unknown dialogue node: {0}")]
    UnknownNode(String),

    /// The response log changed between read and conditional write
    #[error("response log for account {account_id} was modified concurrently")]
    WriteConflict { account_id: Uuid },

    /// Transient collaborator failure; the event should be redelivered
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    /// A persisted document failed to decode
    #[error("malformed document in {collection}/{id}: {source}")]
    MalformedDocument {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DomainError {
    /// Whether the caller should leave the inbound event unacknowledged so
    /// the bus redelivers it. Everything else is dropped after logging.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::WriteConflict { .. } | DomainError::StoreUnavailable(_)
        )
    }
}

/// Result alias used throughout the crate
pub type DomainResult<T> = Result<T, DomainError>;
