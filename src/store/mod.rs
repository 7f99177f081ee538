//! Durable document storage for dialogue data
//!
//! The engine persists everything through a narrow key-value document
//! contract: authored dialogue nodes, per-account response logs, accounts,
//! and external identity links. Writes are conditional on a document
//! version so concurrent read-modify-write cycles on the same response log
//! surface as [`DomainError::WriteConflict`] instead of silently losing an
//! update.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::value_objects::{Account, DialogueNode, ExternalIdentityLink, ResponseEntry};

pub mod memory;

pub use memory::MemoryDocumentStore;

/// Collection holding authored [`DialogueNode`] documents
pub const NODES_COLLECTION: &str = "dialogue_nodes";
/// Collection holding per-account response logs
pub const LOGS_COLLECTION: &str = "response_logs";
/// Collection holding internal accounts, keyed by account id
pub const ACCOUNTS_COLLECTION: &str = "accounts";
/// Index collection mapping email to account id, keyed by email
pub const ACCOUNT_EMAILS_COLLECTION: &str = "account_emails";
/// Collection holding external identity links
pub const IDENTITY_LINKS_COLLECTION: &str = "identity_links";

/// A stored document together with its version counter
#[derive(Debug, Clone)]
pub struct VersionedDoc {
    pub value: Value,
    pub version: u64,
}

/// Precondition for a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGuard {
    /// Unconditional overwrite
    Any,
    /// The document must not exist yet
    Absent,
    /// The stored version must match
    Matches(u64),
}

/// Generic get/set/delete by collection and id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document with its current version
    async fn get(&self, collection: &str, id: &str) -> DomainResult<Option<VersionedDoc>>;

    /// Write a document if the guard holds, returning the new version.
    /// A failed guard yields [`DomainError::WriteConflict`].
    async fn put(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        guard: VersionGuard,
    ) -> DomainResult<u64>;

    /// Remove a document; removing a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> DomainResult<()>;

    /// List document ids in a collection starting with the given prefix
    async fn list_ids(&self, collection: &str, prefix: &str) -> DomainResult<Vec<String>>;
}

/// Persisted shape of a response log document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseLogDoc {
    responses: Vec<ResponseEntry>,
}

/// Persisted shape of the email index document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailIndexDoc {
    account_id: Uuid,
}

/// Typed access layer over the generic document contract
pub struct DialogueStore {
    store: Arc<dyn DocumentStore>,
}

impl DialogueStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn decode<T: serde::de::DeserializeOwned>(
        collection: &str,
        id: &str,
        value: Value,
    ) -> DomainResult<T> {
        serde_json::from_value(value).map_err(|source| DomainError::MalformedDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        })
    }

    fn encode<T: Serialize>(value: &T) -> Value {
        // Our document types serialize infallibly: string keys, no non-finite floats
        serde_json::to_value(value).unwrap_or(Value::Null)
    }

    /// Load an authored dialogue node by id
    pub async fn load_node(&self, node_id: &str) -> DomainResult<Option<DialogueNode>> {
        match self.store.get(NODES_COLLECTION, node_id).await? {
            Some(doc) => Ok(Some(Self::decode(NODES_COLLECTION, node_id, doc.value)?)),
            None => Ok(None),
        }
    }

    /// Write an authored dialogue node. Authoring is external to the engine;
    /// this exists for seeding stores in tests and demos.
    pub async fn save_node(&self, node: &DialogueNode) -> DomainResult<()> {
        self.store
            .put(
                NODES_COLLECTION,
                &node.id,
                Self::encode(node),
                VersionGuard::Any,
            )
            .await?;
        Ok(())
    }

    /// Load an account's response log with the version to guard the write
    pub async fn load_log(
        &self,
        account_id: Uuid,
    ) -> DomainResult<(Vec<ResponseEntry>, Option<u64>)> {
        let id = account_id.to_string();
        match self.store.get(LOGS_COLLECTION, &id).await? {
            Some(doc) => {
                let log: ResponseLogDoc = Self::decode(LOGS_COLLECTION, &id, doc.value)?;
                Ok((log.responses, Some(doc.version)))
            }
            None => Ok((Vec::new(), None)),
        }
    }

    /// Overwrite an account's response log as a single document write,
    /// conditional on the version observed at load time.
    pub async fn save_log(
        &self,
        account_id: Uuid,
        responses: &[ResponseEntry],
        expected: Option<u64>,
    ) -> DomainResult<u64> {
        let guard = match expected {
            Some(version) => VersionGuard::Matches(version),
            None => VersionGuard::Absent,
        };
        let doc = ResponseLogDoc {
            responses: responses.to_vec(),
        };
        self.store
            .put(
                LOGS_COLLECTION,
                &account_id.to_string(),
                Self::encode(&doc),
                guard,
            )
            .await
            .map_err(|err| match err {
                // The generic layer does not know whose log this is
                DomainError::WriteConflict { .. } => DomainError::WriteConflict { account_id },
                other => other,
            })
    }

    /// Remove an account's response log
    pub async fn delete_log(&self, account_id: Uuid) -> DomainResult<()> {
        self.store
            .delete(LOGS_COLLECTION, &account_id.to_string())
            .await
    }

    /// Look up an account by email via the index collection
    pub async fn find_account_by_email(&self, email: &str) -> DomainResult<Option<Account>> {
        let index = match self.store.get(ACCOUNT_EMAILS_COLLECTION, email).await? {
            Some(doc) => {
                Self::decode::<EmailIndexDoc>(ACCOUNT_EMAILS_COLLECTION, email, doc.value)?
            }
            None => return Ok(None),
        };
        self.load_account(index.account_id).await
    }

    /// Load an account by id
    pub async fn load_account(&self, account_id: Uuid) -> DomainResult<Option<Account>> {
        let id = account_id.to_string();
        match self.store.get(ACCOUNTS_COLLECTION, &id).await? {
            Some(doc) => Ok(Some(Self::decode(ACCOUNTS_COLLECTION, &id, doc.value)?)),
            None => Ok(None),
        }
    }

    /// Persist a new account and its email index entry.
    ///
    /// The index write uses an `Absent` guard, so two racing creates for the
    /// same email collapse into one winner and a [`DomainError::WriteConflict`].
    pub async fn create_account(&self, account: &Account) -> DomainResult<()> {
        let index = EmailIndexDoc {
            account_id: account.account_id,
        };
        self.store
            .put(
                ACCOUNT_EMAILS_COLLECTION,
                &account.email,
                Self::encode(&index),
                VersionGuard::Absent,
            )
            .await?;
        self.store
            .put(
                ACCOUNTS_COLLECTION,
                &account.account_id.to_string(),
                Self::encode(account),
                VersionGuard::Any,
            )
            .await?;
        Ok(())
    }

    /// Remove an account document and its email index entry
    pub async fn delete_account(&self, account: &Account) -> DomainResult<()> {
        self.store
            .delete(ACCOUNTS_COLLECTION, &account.account_id.to_string())
            .await?;
        self.store
            .delete(ACCOUNT_EMAILS_COLLECTION, &account.email)
            .await
    }

    fn link_id(link: &ExternalIdentityLink) -> String {
        match &link.channel_id {
            Some(channel) => format!(
                "{}:{}:{}",
                link.account_id, link.external_team_id, channel
            ),
            None => format!("{}:{}", link.account_id, link.external_team_id),
        }
    }

    /// Upsert an identity link; last write wins
    pub async fn save_identity_link(&self, link: &ExternalIdentityLink) -> DomainResult<()> {
        self.store
            .put(
                IDENTITY_LINKS_COLLECTION,
                &Self::link_id(link),
                Self::encode(link),
                VersionGuard::Any,
            )
            .await?;
        Ok(())
    }

    /// Remove every identity link belonging to an account
    pub async fn delete_identity_links(&self, account_id: Uuid) -> DomainResult<()> {
        let prefix = format!("{account_id}:");
        for id in self
            .store
            .list_ids(IDENTITY_LINKS_COLLECTION, &prefix)
            .await?
        {
            self.store.delete(IDENTITY_LINKS_COLLECTION, &id).await?;
        }
        Ok(())
    }

    /// Identity links currently stored for an account
    pub async fn load_identity_links(
        &self,
        account_id: Uuid,
    ) -> DomainResult<Vec<ExternalIdentityLink>> {
        let prefix = format!("{account_id}:");
        let mut links = Vec::new();
        for id in self
            .store
            .list_ids(IDENTITY_LINKS_COLLECTION, &prefix)
            .await?
        {
            if let Some(doc) = self.store.get(IDENTITY_LINKS_COLLECTION, &id).await? {
                links.push(Self::decode(IDENTITY_LINKS_COLLECTION, &id, doc.value)?);
            }
        }
        Ok(links)
    }
}
