//! Contracts consumed from the messaging platform
//!
//! The engine never talks to the platform directly; it needs a profile
//! lookup, an outbound direct-message call, a one-shot surface view publish,
//! and a per-team bot token. Implementations live outside the core.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DomainResult;
use crate::value_objects::{OutboundMessage, UserProfile};

/// Platform API client
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch the platform's profile for a user
    async fn get_user_profile(
        &self,
        token: &str,
        external_user_id: &str,
    ) -> DomainResult<UserProfile>;

    /// Send a direct message rendering the prompt and its action buttons
    async fn send_direct_message(
        &self,
        token: &str,
        external_user_id: &str,
        message: &OutboundMessage,
    ) -> DomainResult<()>;

    /// Publish a surface view (e.g. the app home tab) for a user
    async fn publish_surface_view(
        &self,
        token: &str,
        external_user_id: &str,
        view: Value,
    ) -> DomainResult<()>;
}

/// Bot token lookup, keyed by external team id
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn bot_token(&self, team_id: &str) -> DomainResult<String>;
}
