//! Value objects for the guided dialogue domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Transition key used when the user answers with free text instead of a button
pub const ANSWER_KEY: &str = "answer";

/// Reserved action that resets the conversation to the freshly entered node
pub const CANCEL_ACTION: &str = "cancel";

/// Prefix marking an action label as a link-style button
pub const URL_ACTION_PREFIX: &str = "url_";

/// One step of the scripted conversation: a prompt plus the possible user
/// actions and the next node for each. Authored data, never mutated by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueNode {
    /// Node identifier, unique within the dialogue
    pub id: String,
    /// Prompt text shown to the user
    pub prompt: String,
    /// Ordered action labels rendered as buttons
    pub actions: Vec<String>,
    /// Map from action label (or [`ANSWER_KEY`]) to the next node id
    pub transitions: HashMap<String, String>,
}

impl DialogueNode {
    /// Next node id for the given action label or answer key, if authored
    pub fn transition(&self, key: &str) -> Option<&str> {
        self.transitions.get(key).map(String::as_str)
    }

    /// A node with no outgoing transitions is implicitly terminal
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Historical record of one node the user has seen.
///
/// `answer_text` and `chosen_action` start empty and are filled in exactly
/// once, when the user responds to that node. An entry with both empty is
/// the pending entry: the user's current position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEntry {
    /// Id of the node this entry records
    pub node_id: String,
    /// Prompt text, copied from the node at entry time
    pub prompt: String,
    /// Action labels, copied from the node
    pub actions: Vec<String>,
    /// Transition map, copied from the node
    pub transitions: HashMap<String, String>,
    /// When the entry was appended
    pub recorded_at: DateTime<Utc>,
    /// Free-text answer, empty until the user replies
    #[serde(default)]
    pub answer_text: String,
    /// Chosen button value, empty until the user presses one
    #[serde(default)]
    pub chosen_action: String,
}

impl ResponseEntry {
    /// Create a fresh pending entry from an authored node
    pub fn pending_for(node: &DialogueNode) -> Self {
        Self {
            node_id: node.id.clone(),
            prompt: node.prompt.clone(),
            actions: node.actions.clone(),
            transitions: node.transitions.clone(),
            recorded_at: Utc::now(),
            answer_text: String::new(),
            chosen_action: String::new(),
        }
    }

    /// Whether this entry has not been answered yet
    pub fn is_pending(&self) -> bool {
        self.answer_text.is_empty() && self.chosen_action.is_empty()
    }

    /// Next node id for the given transition key, from the copied map
    pub fn transition(&self, key: &str) -> Option<&str> {
        self.transitions.get(key).map(String::as_str)
    }
}

/// User input driving one transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserInput {
    /// A button press carrying the action value
    Action(String),
    /// A free-text message
    Text(String),
}

impl UserInput {
    /// Transition key this input resolves against
    pub fn transition_key(&self) -> &str {
        match self {
            UserInput::Action(action) => action,
            UserInput::Text(_) => ANSWER_KEY,
        }
    }
}

/// Internal account, created lazily on first contact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Internal account id
    pub account_id: Uuid,
    /// Email, unique across accounts
    pub email: String,
    /// Display name from the platform profile
    pub display_name: String,
}

/// Reference to a user on the messaging platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalUserRef {
    /// The platform's user id
    pub external_user_id: String,
    /// The platform's team/workspace id
    pub external_team_id: String,
    /// Team domain, when the platform supplies one
    pub team_domain: Option<String>,
    /// Channel the event originated from, if any
    pub channel_id: Option<String>,
    /// Channel name, if any
    pub channel_name: Option<String>,
}

/// Profile fields fetched from the platform's user lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub user_name: Option<String>,
}

/// Denormalized link from an external identity to an internal account,
/// cached for outbound-message addressing. Many links per account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalIdentityLink {
    pub account_id: Uuid,
    pub external_team_id: String,
    pub external_user_id: String,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub display_name: String,
    pub user_name: String,
    pub team_domain: String,
}

/// Visual weight of an action button
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ButtonStyle {
    /// Emphasized styling, used for `ok` and `restart`
    Primary,
    /// Default styling
    Plain,
}

/// A rendered action button
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionButton {
    /// Raw action value submitted back on press
    pub value: String,
    /// Display text, with any `url_` marker stripped
    pub label: String,
    /// Visual style
    pub style: ButtonStyle,
    /// Link target for `url_`-prefixed labels
    pub url: Option<String>,
}

/// A prompt plus rendered action list, ready for the platform client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Prompt text
    pub text: String,
    /// Buttons in authored order
    pub buttons: Vec<ActionButton>,
}

impl OutboundMessage {
    /// A plain text message with no buttons
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: content.into(),
            buttons: Vec::new(),
        }
    }
}

impl ActionButton {
    /// Render an authored action label into a button.
    ///
    /// Labels prefixed with `url_` become link buttons pointing at
    /// `<link_base_url>/<label without prefix>`; `ok` and `restart` get
    /// primary styling; everything else is a plain button.
    pub fn render(action: &str, link_base_url: &str) -> Self {
        let display = action.strip_prefix(URL_ACTION_PREFIX).unwrap_or(action);
        let url = action
            .strip_prefix(URL_ACTION_PREFIX)
            .map(|slug| format!("{}/{}", link_base_url.trim_end_matches('/'), slug));
        let style = if action == "ok" || action == "restart" {
            ButtonStyle::Primary
        } else {
            ButtonStyle::Plain
        };

        Self {
            value: action.to_string(),
            label: display.to_string(),
            style,
            url,
        }
    }
}
