//! Guided dialogue domain module
//!
//! This crate drives a scripted, branching conversation with a remote user
//! over a messaging platform. It provides:
//! - Authored dialogue nodes with button actions and free-text transitions
//! - A durable per-account response log from which the current position is
//!   always derived, surviving restarts and duplicate deliveries
//! - Identity resolution binding external chat identities to internal
//!   accounts, created lazily on first contact
//! - An event dispatcher that routes inbound platform events to handlers
//!   and isolates their failures
//!
//! Transport, signature verification, and the platform API itself are
//! external collaborators; the crate only defines the contracts it needs
//! from them ([`platform`], [`store::DocumentStore`]).

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod platform;
pub mod session;
pub mod store;
pub mod value_objects;

// Re-export main types
pub use engine::{AdvanceResult, DialogueEngine, EngineConfig};

pub use dispatch::{
    DialogueEventHandler, DispatchReport, EventDispatcher, EventHandler, HandlerOutcome,
    InboundEvent, LoggingHandler,
};

pub use error::{DomainError, DomainResult};

pub use identity::{AccountDirectory, IdentityResolver, ResolvedIdentity, StoreAccountDirectory};

pub use platform::{PlatformClient, TokenStore};

pub use session::Session;

pub use store::{DialogueStore, DocumentStore, MemoryDocumentStore, VersionGuard, VersionedDoc};

pub use value_objects::{
    ANSWER_KEY, Account, ActionButton, ButtonStyle, CANCEL_ACTION, DialogueNode,
    ExternalIdentityLink, ExternalUserRef, OutboundMessage, ResponseEntry, URL_ACTION_PREFIX,
    UserInput, UserProfile,
};
