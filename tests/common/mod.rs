//! Shared collaborator fakes for the integration tests

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use guided_dialog::{
    DialogueEngine, DialogueEventHandler, DialogueStore, DomainResult, EngineConfig,
    IdentityResolver, MemoryDocumentStore, OutboundMessage, PlatformClient,
    StoreAccountDirectory, TokenStore, UserProfile,
};

/// Platform client that records outbound calls and serves canned profiles
#[derive(Default)]
pub struct FakePlatform {
    pub profiles: RwLock<HashMap<String, UserProfile>>,
    pub sent: RwLock<Vec<(String, OutboundMessage)>>,
    pub views: RwLock<Vec<(String, Value)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_profile(&self, external_user_id: &str, email: &str, display_name: &str) {
        self.profiles.write().await.insert(
            external_user_id.to_string(),
            UserProfile {
                email: Some(email.to_string()),
                display_name: Some(display_name.to_string()),
                user_name: Some(display_name.to_lowercase().replace(' ', ".")),
            },
        );
    }

    pub async fn sent_texts(&self, external_user_id: &str) -> Vec<String> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(user, _)| user == external_user_id)
            .map(|(_, message)| message.text.clone())
            .collect()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn get_user_profile(
        &self,
        _token: &str,
        external_user_id: &str,
    ) -> DomainResult<UserProfile> {
        Ok(self
            .profiles
            .read()
            .await
            .get(external_user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_direct_message(
        &self,
        _token: &str,
        external_user_id: &str,
        message: &OutboundMessage,
    ) -> DomainResult<()> {
        self.sent
            .write()
            .await
            .push((external_user_id.to_string(), message.clone()));
        Ok(())
    }

    async fn publish_surface_view(
        &self,
        _token: &str,
        external_user_id: &str,
        view: Value,
    ) -> DomainResult<()> {
        self.views
            .write()
            .await
            .push((external_user_id.to_string(), view));
        Ok(())
    }
}

/// Token store handing out a deterministic per-team token
pub struct FakeTokens;

#[async_trait]
impl TokenStore for FakeTokens {
    async fn bot_token(&self, team_id: &str) -> DomainResult<String> {
        Ok(format!("bot-token-{team_id}"))
    }
}

/// Fully wired core over in-memory collaborators
pub struct TestHarness {
    pub store: Arc<DialogueStore>,
    pub platform: Arc<FakePlatform>,
    pub resolver: Arc<IdentityResolver>,
    pub engine: Arc<DialogueEngine>,
    pub handler: Arc<DialogueEventHandler>,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(DialogueStore::new(Arc::new(MemoryDocumentStore::new())));
        let platform = Arc::new(FakePlatform::new());
        let tokens = Arc::new(FakeTokens);
        let directory = Arc::new(StoreAccountDirectory::new(store.clone()));
        let resolver = Arc::new(IdentityResolver::new(
            store.clone(),
            directory,
            platform.clone(),
            tokens.clone(),
        ));
        let engine = Arc::new(DialogueEngine::new(store.clone(), EngineConfig::default()));
        let handler = Arc::new(DialogueEventHandler::new(
            resolver.clone(),
            engine.clone(),
            platform.clone(),
            tokens,
        ));

        Self {
            store,
            platform,
            resolver,
            engine,
            handler,
        }
    }
}
