//! Inbound event dispatch
//!
//! Events arrive from an at-least-once bus, already decoded into the typed
//! [`InboundEvent`] variants. The dispatcher routes each event through every
//! registered handler in registration order and isolates failures: a failing
//! handler is logged and the remaining handlers still run. The per-handler
//! outcomes are reported back so the transport can decide whether to
//! acknowledge the delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::DialogueEngine;
use crate::error::{DomainError, DomainResult};
use crate::identity::IdentityResolver;
use crate::platform::{PlatformClient, TokenStore};
use crate::value_objects::{ExternalUserRef, OutboundMessage, UserInput};

/// Typed inbound events from the messaging platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InboundEvent {
    /// The user posted a free-text message to the bot
    MessagePosted {
        external_user_id: String,
        external_team_id: String,
        text: String,
        /// Set for messages authored by bots, including ourselves
        from_bot: bool,
    },
    /// The user pressed an interactive button
    ActionInvoked {
        user_ref: ExternalUserRef,
        action: String,
    },
    /// The user opened the app home surface
    HomeOpened {
        external_user_id: String,
        external_team_id: String,
    },
    /// An account was deleted elsewhere; clean up its documents
    AccountDeleted { account_id: Uuid },
}

impl InboundEvent {
    /// Wire type tag used by the bus metadata
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::MessagePosted { .. } => "message_posted",
            InboundEvent::ActionInvoked { .. } => "action_invoked",
            InboundEvent::HomeOpened { .. } => "home_opened",
            InboundEvent::AccountDeleted { .. } => "account_deleted",
        }
    }
}

/// A handler invoked for every dispatched event
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs and dispatch reports
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &InboundEvent) -> DomainResult<()>;
}

/// Outcome of one handler for one event
#[derive(Debug)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub result: DomainResult<()>,
}

/// Per-event dispatch summary
#[derive(Debug)]
pub struct DispatchReport {
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    /// Whether every handler completed without error
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    /// Whether any failure warrants leaving the event unacknowledged
    pub fn needs_redelivery(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| matches!(&outcome.result, Err(err) if err.is_retryable()))
    }
}

/// Routes events to handlers in fixed registration order
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers run in registration order
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Invoke every handler for the event, isolating failures
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        let mut outcomes = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let result = handler.handle(event).await;
            if let Err(err) = &result {
                tracing::warn!(
                    handler = handler.name(),
                    event = event.kind(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "event handler failed"
                );
            }
            outcomes.push(HandlerOutcome {
                handler: handler.name(),
                result,
            });
        }
        DispatchReport { outcomes }
    }
}

/// Handler that just logs every event it sees
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, event: &InboundEvent) -> DomainResult<()> {
        tracing::info!(event = event.kind(), "inbound event");
        Ok(())
    }
}

/// The main handler: resolves identity, advances the dialogue, and sends the
/// rendered reply through the platform client.
pub struct DialogueEventHandler {
    resolver: Arc<IdentityResolver>,
    engine: Arc<DialogueEngine>,
    platform: Arc<dyn PlatformClient>,
    tokens: Arc<dyn TokenStore>,
}

impl DialogueEventHandler {
    pub fn new(
        resolver: Arc<IdentityResolver>,
        engine: Arc<DialogueEngine>,
        platform: Arc<dyn PlatformClient>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            resolver,
            engine,
            platform,
            tokens,
        }
    }

    async fn send(
        &self,
        token: &str,
        external_user_id: &str,
        message: &OutboundMessage,
    ) -> DomainResult<()> {
        self.platform
            .send_direct_message(token, external_user_id, message)
            .await
    }

    /// Resolve the identity and send the one-time welcome on first contact
    async fn resolve_and_welcome(
        &self,
        user_ref: &ExternalUserRef,
        token: &str,
    ) -> DomainResult<Uuid> {
        let resolved = self.resolver.resolve(user_ref).await?;
        if resolved.is_new_account {
            let welcome = OutboundMessage::text(self.engine.config().welcome_text.clone());
            self.send(token, &user_ref.external_user_id, &welcome).await?;
        }
        Ok(resolved.account.account_id)
    }

    async fn on_message_posted(
        &self,
        external_user_id: &str,
        external_team_id: &str,
        text: &str,
    ) -> DomainResult<()> {
        let token = self.tokens.bot_token(external_team_id).await?;
        let user_ref = ExternalUserRef {
            external_user_id: external_user_id.to_string(),
            external_team_id: external_team_id.to_string(),
            team_domain: None,
            channel_id: None,
            channel_name: None,
        };
        let account_id = self.resolve_and_welcome(&user_ref, &token).await?;

        let result = self
            .engine
            .advance(account_id, &UserInput::Text(text.to_string()))
            .await?;
        if !result.started {
            let echo = OutboundMessage::text(format!("Answer: {text}"));
            self.send(&token, external_user_id, &echo).await?;
        }
        self.send(&token, external_user_id, &result.message).await
    }

    async fn on_action_invoked(
        &self,
        user_ref: &ExternalUserRef,
        action: &str,
    ) -> DomainResult<()> {
        let token = self.tokens.bot_token(&user_ref.external_team_id).await?;
        let account_id = self.resolve_and_welcome(user_ref, &token).await?;

        let result = self
            .engine
            .advance(account_id, &UserInput::Action(action.to_string()))
            .await?;
        self.send(&token, &user_ref.external_user_id, &result.message)
            .await
    }

    async fn on_home_opened(
        &self,
        external_user_id: &str,
        external_team_id: &str,
    ) -> DomainResult<()> {
        let token = self.tokens.bot_token(external_team_id).await?;
        let user_ref = ExternalUserRef {
            external_user_id: external_user_id.to_string(),
            external_team_id: external_team_id.to_string(),
            team_domain: None,
            channel_id: None,
            channel_name: None,
        };
        self.resolve_and_welcome(&user_ref, &token).await?;

        let view = json!({
            "type": "home",
            "blocks": [
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": "App home for the guided dialogue." }
                },
                { "type": "divider" }
            ]
        });
        self.platform
            .publish_surface_view(&token, external_user_id, view)
            .await
    }
}

#[async_trait]
impl EventHandler for DialogueEventHandler {
    fn name(&self) -> &'static str {
        "dialogue"
    }

    async fn handle(&self, event: &InboundEvent) -> DomainResult<()> {
        let result = match event {
            InboundEvent::MessagePosted { from_bot: true, .. } => {
                // Ignore messages from bots, including ourselves
                return Ok(());
            }
            InboundEvent::MessagePosted {
                external_user_id,
                external_team_id,
                text,
                ..
            } => {
                self.on_message_posted(external_user_id, external_team_id, text)
                    .await
            }
            InboundEvent::ActionInvoked { user_ref, action } => {
                self.on_action_invoked(user_ref, action).await
            }
            InboundEvent::HomeOpened {
                external_user_id,
                external_team_id,
            } => {
                self.on_home_opened(external_user_id, external_team_id)
                    .await
            }
            InboundEvent::AccountDeleted { account_id } => {
                self.resolver.delete_account(*account_id).await
            }
        };

        match result {
            // Drop-and-log failures: the conversation stalls or the event is
            // irrelevant, and redelivery would not change the outcome.
            Err(err @ DomainError::MissingProfileField { .. })
            | Err(err @ DomainError::UnknownTransition { .. }) => {
                tracing::warn!(event = event.kind(), error = %err, "dropping event");
                Ok(())
            }
            other => other,
        }
    }
}
