//! Dialogue engine - the state machine advancing users through the dialogue
//!
//! States are dialogue node ids; the current state is never stored directly
//! but derived from the last entry of the durable response log. Each inbound
//! input runs one read-modify-write cycle over the whole log, guarded per
//! account by an async lock and a conditional write so duplicate or racing
//! deliveries cannot silently lose an update.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::session::Session;
use crate::store::DialogueStore;
use crate::value_objects::{ActionButton, DialogueNode, OutboundMessage, UserInput};

fn default_entry_node_id() -> String {
    "start".to_string()
}

fn default_link_base_url() -> String {
    "https://springout.org/into".to_string()
}

fn default_welcome_text() -> String {
    "Welcome! I have created a new account for you.".to_string()
}

fn default_max_write_retries() -> u32 {
    3
}

/// Engine configuration, deserializable from the service config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Node the dialogue begins at on first contact
    #[serde(default = "default_entry_node_id")]
    pub entry_node_id: String,
    /// Base URL for `url_`-prefixed link buttons
    #[serde(default = "default_link_base_url")]
    pub link_base_url: String,
    /// One-time welcome message sent when an account is created
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
    /// Attempts per advance before a write conflict is surfaced as retryable
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_node_id: default_entry_node_id(),
            link_base_url: default_link_base_url(),
            welcome_text: default_welcome_text(),
            max_write_retries: default_max_write_retries(),
        }
    }
}

/// Result of one successful [`DialogueEngine::advance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Prompt and buttons for the node the user is now at
    pub message: OutboundMessage,
    /// True when this input began the conversation on an empty log
    pub started: bool,
}

/// Advances response logs on button presses and free-text answers
pub struct DialogueEngine {
    store: Arc<DialogueStore>,
    config: EngineConfig,
    /// Per-account mutual exclusion; accounts are independent
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DialogueEngine {
    pub fn new(store: Arc<DialogueStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn account_lock(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(account_id).or_default().clone()
    }

    /// Apply one user input to an account's dialogue and return the message
    /// to send back.
    ///
    /// At most one `advance` runs per account at a time. Conditional-write
    /// conflicts are retried up to the configured bound, then surfaced as
    /// retryable so the transport leaves the event unacknowledged.
    pub async fn advance(
        &self,
        account_id: Uuid,
        input: &UserInput,
    ) -> DomainResult<AdvanceResult> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.advance_once(account_id, input).await {
                Err(DomainError::WriteConflict { .. })
                    if attempt < self.config.max_write_retries =>
                {
                    tracing::warn!(%account_id, attempt, "log write conflict, retrying advance");
                }
                result => return result,
            }
        }
    }

    /// One read-modify-write cycle over the account's response log
    async fn advance_once(
        &self,
        account_id: Uuid,
        input: &UserInput,
    ) -> DomainResult<AdvanceResult> {
        let (entries, version) = self.store.load_log(account_id).await?;
        let mut session = Session::from_entries(account_id, entries);

        let Some(mut last) = session.take_last() else {
            // First contact: begin at the entry node regardless of the input
            let node = self.require_node(&self.config.entry_node_id).await?;
            session.enter(&node);
            self.store
                .save_log(account_id, session.entries(), version)
                .await?;
            tracing::info!(%account_id, node_id = %node.id, "conversation started");
            return Ok(AdvanceResult {
                message: self.render(&node),
                started: true,
            });
        };

        let key = input.transition_key().to_string();
        match input {
            UserInput::Action(action) => last.chosen_action = action.clone(),
            UserInput::Text(text) => last.answer_text = text.clone(),
        }
        let source_node_id = last.node_id.clone();
        let recorded_action = last.chosen_action.clone();
        let target_id = last.transition(&key).map(str::to_string);
        session.push(last);

        let Some(target_id) = target_id else {
            // The response is recorded even though the conversation stalls
            // at the same node until the dialogue author adds the edge.
            self.store
                .save_log(account_id, session.entries(), version)
                .await?;
            tracing::warn!(
                %account_id,
                node_id = %source_node_id,
                input = %key,
                "no transition for input, dropping event"
            );
            return Err(DomainError::UnknownTransition {
                node_id: source_node_id,
                input: key,
            });
        };

        let node = self.require_node(&target_id).await?;
        session.enter(&node);

        if Session::is_reset_action(&recorded_action) {
            session.reset_to_last();
        }

        self.store
            .save_log(account_id, session.entries(), version)
            .await?;
        tracing::debug!(
            %account_id,
            from = %source_node_id,
            to = %node.id,
            "advanced dialogue"
        );
        Ok(AdvanceResult {
            message: self.render(&node),
            started: false,
        })
    }

    async fn require_node(&self, node_id: &str) -> DomainResult<DialogueNode> {
        self.store
            .load_node(node_id)
            .await?
            .ok_or_else(|| DomainError::UnknownNode(node_id.to_string()))
    }

    /// Render a node's prompt and action list for the platform client
    fn render(&self, node: &DialogueNode) -> OutboundMessage {
        OutboundMessage {
            text: node.prompt.clone(),
            buttons: node
                .actions
                .iter()
                .map(|action| ActionButton::render(action, &self.config.link_base_url))
                .collect(),
        }
    }
}
