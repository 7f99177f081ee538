//! In-process document store
//!
//! Backs tests and demos, and serves as the reference model for the
//! conditional-write contract a production store must honor.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

use super::{DocumentStore, VersionGuard, VersionedDoc};

#[derive(Debug, Clone)]
struct StoredDoc {
    value: Value,
    version: u64,
}

/// HashMap-backed [`DocumentStore`] with per-document version counters
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, StoredDoc>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict() -> DomainError {
        // The generic contract does not know which account a log belongs to;
        // the typed layer maps ids, so a nil account id is enough here.
        DomainError::WriteConflict {
            account_id: Uuid::nil(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> DomainResult<Option<VersionedDoc>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| VersionedDoc {
                value: doc.value.clone(),
                version: doc.version,
            }))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        guard: VersionGuard,
    ) -> DomainResult<u64> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(id).map(|doc| doc.version);

        let next = match (guard, current) {
            (VersionGuard::Any, current) => current.unwrap_or(0) + 1,
            (VersionGuard::Absent, None) => 1,
            (VersionGuard::Absent, Some(_)) => return Err(Self::conflict()),
            (VersionGuard::Matches(expected), Some(version)) if version == expected => version + 1,
            (VersionGuard::Matches(_), _) => return Err(Self::conflict()),
        };

        docs.insert(
            id.to_string(),
            StoredDoc {
                value,
                version: next,
            },
        );
        Ok(next)
    }

    async fn delete(&self, collection: &str, id: &str) -> DomainResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn list_ids(&self, collection: &str, prefix: &str) -> DomainResult<Vec<String>> {
        let collections = self.collections.read().await;
        let mut ids: Vec<String> = collections
            .get(collection)
            .map(|docs| {
                docs.keys()
                    .filter(|id| id.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}
