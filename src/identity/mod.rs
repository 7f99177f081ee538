//! Identity resolution - binding external chat identities to internal accounts
//!
//! Every inbound event names a user by the platform's own ids. The resolver
//! fetches the platform profile, finds or lazily creates the internal
//! account keyed by email, and caches denormalized identity links for
//! outbound addressing. Account deletion cascades to everything stored per
//! account.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::platform::{PlatformClient, TokenStore};
use crate::store::DialogueStore;
use crate::value_objects::{Account, ExternalIdentityLink, ExternalUserRef};

/// Account lookup and lifecycle, one account per email
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<Account>>;
    async fn create(&self, email: &str, display_name: &str) -> DomainResult<Account>;
    async fn delete(&self, account: &Account) -> DomainResult<()>;
}

/// Directory backed by the dialogue document store
pub struct StoreAccountDirectory {
    store: Arc<DialogueStore>,
}

impl StoreAccountDirectory {
    pub fn new(store: Arc<DialogueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccountDirectory for StoreAccountDirectory {
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<Account>> {
        self.store.find_account_by_email(email).await
    }

    async fn create(&self, email: &str, display_name: &str) -> DomainResult<Account> {
        let account = Account {
            account_id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        self.store.create_account(&account).await?;
        Ok(account)
    }

    async fn delete(&self, account: &Account) -> DomainResult<()> {
        self.store.delete_account(account).await
    }
}

/// Outcome of identity resolution
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub account: Account,
    /// True exactly once, on first contact. The caller is expected to send
    /// the one-time welcome message when set.
    pub is_new_account: bool,
}

/// Maps external user references to internal accounts
pub struct IdentityResolver {
    store: Arc<DialogueStore>,
    directory: Arc<dyn AccountDirectory>,
    platform: Arc<dyn PlatformClient>,
    tokens: Arc<dyn TokenStore>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<DialogueStore>,
        directory: Arc<dyn AccountDirectory>,
        platform: Arc<dyn PlatformClient>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            store,
            directory,
            platform,
            tokens,
        }
    }

    /// Resolve an external user reference to an internal account, creating
    /// the account on first contact and upserting identity links.
    ///
    /// Fails with [`DomainError::MissingProfileField`] when the platform
    /// profile lacks an email or display name; callers drop the event.
    pub async fn resolve(&self, external: &ExternalUserRef) -> DomainResult<ResolvedIdentity> {
        let token = self.tokens.bot_token(&external.external_team_id).await?;
        let profile = self
            .platform
            .get_user_profile(&token, &external.external_user_id)
            .await?;

        let email = profile
            .email
            .as_deref()
            .filter(|email| !email.is_empty())
            .ok_or_else(|| DomainError::MissingProfileField {
                external_user_id: external.external_user_id.clone(),
                field: "email",
            })?;
        let display_name = profile
            .display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DomainError::MissingProfileField {
                external_user_id: external.external_user_id.clone(),
                field: "display name",
            })?;

        let (account, is_new_account) = match self.directory.find_by_email(email).await? {
            Some(account) => (account, false),
            None => match self.directory.create(email, display_name).await {
                Ok(account) => {
                    tracing::info!(
                        account_id = %account.account_id,
                        email,
                        "created new account on first contact"
                    );
                    (account, true)
                }
                // A concurrent resolve for the same email won the create race
                Err(DomainError::WriteConflict { .. }) => {
                    let account = self.directory.find_by_email(email).await?.ok_or_else(|| {
                        DomainError::StoreUnavailable(format!(
                            "account for {email} vanished after create conflict"
                        ))
                    })?;
                    (account, false)
                }
                Err(err) => return Err(err),
            },
        };

        let team_link = ExternalIdentityLink {
            account_id: account.account_id,
            external_team_id: external.external_team_id.clone(),
            external_user_id: external.external_user_id.clone(),
            channel_id: None,
            channel_name: None,
            display_name: display_name.to_string(),
            user_name: profile.user_name.clone().unwrap_or_default(),
            team_domain: external.team_domain.clone().unwrap_or_default(),
        };
        self.link_external_identity(&team_link).await?;

        if external.channel_id.is_some() {
            let channel_link = ExternalIdentityLink {
                channel_id: external.channel_id.clone(),
                channel_name: external.channel_name.clone(),
                ..team_link
            };
            self.link_external_identity(&channel_link).await?;
        }

        Ok(ResolvedIdentity {
            account,
            is_new_account,
        })
    }

    /// Idempotent last-write-wins upsert of an identity link
    pub async fn link_external_identity(&self, link: &ExternalIdentityLink) -> DomainResult<()> {
        self.store.save_identity_link(link).await
    }

    /// Cascading cleanup for an explicit account deletion: response log,
    /// identity links, then the account itself.
    pub async fn delete_account(&self, account_id: Uuid) -> DomainResult<()> {
        tracing::info!(%account_id, "deleting account and per-account documents");
        self.store.delete_log(account_id).await?;
        self.store.delete_identity_links(account_id).await?;
        if let Some(account) = self.store.load_account(account_id).await? {
            self.directory.delete(&account).await?;
        }
        Ok(())
    }
}
