//! Session aggregate - one account's progress through the dialogue
//!
//! The durable response log is the only state; "where the user is" is always
//! derived from it rather than stored separately. The invariant maintained
//! here: at most the last entry may be pending (unanswered), all earlier
//! entries are fully answered, and an empty log means the conversation has
//! not started.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{CANCEL_ACTION, DialogueNode, ResponseEntry};

/// An account's response log with the derivation logic in one place
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Owning account
    account_id: Uuid,
    /// Ordered response history, oldest first
    entries: Vec<ResponseEntry>,
}

impl Session {
    /// An empty session for an account that has not started the dialogue
    pub fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            entries: Vec::new(),
        }
    }

    /// Rebuild a session from a persisted log
    pub fn from_entries(account_id: Uuid, entries: Vec<ResponseEntry>) -> Self {
        Self {
            account_id,
            entries,
        }
    }

    /// Owning account id
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    /// The full log, oldest first
    pub fn entries(&self) -> &[ResponseEntry] {
        &self.entries
    }

    /// Consume the session, yielding the log for persistence
    pub fn into_entries(self) -> Vec<ResponseEntry> {
        self.entries
    }

    /// Whether the conversation has started
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The most recent entry not yet answered, i.e. the current position
    pub fn pending(&self) -> Option<&ResponseEntry> {
        self.entries.last().filter(|entry| entry.is_pending())
    }

    /// Remove and return the last entry so an answer can be recorded on it
    pub fn take_last(&mut self) -> Option<ResponseEntry> {
        self.entries.pop()
    }

    /// Current node id, derived from the last log entry
    pub fn current_node_id(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.node_id.as_str())
    }

    /// Push an entry back onto the log
    pub fn push(&mut self, entry: ResponseEntry) {
        self.entries.push(entry);
    }

    /// Append a fresh pending entry for a node the user just entered
    pub fn enter(&mut self, node: &DialogueNode) {
        self.entries.push(ResponseEntry::pending_for(node));
    }

    /// Discard all history except the last entry. Applied after the reserved
    /// `cancel` action so the conversation restarts from the entered node.
    pub fn reset_to_last(&mut self) {
        if self.entries.len() > 1 {
            self.entries.drain(..self.entries.len() - 1);
        }
    }

    /// Whether the action just recorded should collapse the history
    pub fn is_reset_action(action: &str) -> bool {
        action == CANCEL_ACTION
    }
}
