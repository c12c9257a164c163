//! Message and chat request domain types.
//!
//! These are the value objects that enter the system at the HTTP edge:
//! client sends a `ChatRequest` → orchestrator validates it → context
//! assembler turns it into a bounded prompt → provider generates a reply.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// An OpenAI-compatible chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Requested model name. Unknown names are routed to the default chain.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ordered conversation messages.
    pub messages: Vec<Message>,

    /// Sampling temperature (0.0–2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response as server-sent events.
    #[serde(default)]
    pub stream: bool,

    /// Optional end-user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

fn default_model() -> String {
    "synapse".into()
}

impl ChatRequest {
    /// Create a non-streaming request for the given messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
            user: None,
        }
    }

    /// Check the request shape before any collaborator is called.
    ///
    /// Accepted layout: zero or more leading system messages, then at least
    /// one user/assistant turn, ending with a user turn.
    pub fn validate(&self, max_tokens_limit: u32) -> Result<(), Error> {
        if self.messages.is_empty() {
            return Err(Error::InvalidRequest(
                "'messages' must contain at least one message".into(),
            ));
        }

        let first_turn = self
            .messages
            .iter()
            .position(|m| m.role != Role::System)
            .ok_or_else(|| {
                Error::InvalidRequest("'messages' must contain a user message".into())
            })?;

        if let Some(offset) = self.messages[first_turn..]
            .iter()
            .position(|m| m.role == Role::System)
        {
            return Err(Error::InvalidRequest(format!(
                "system message at index {} must precede all user/assistant turns",
                first_turn + offset
            )));
        }

        if self.messages.last().map(|m| m.role) != Some(Role::User) {
            return Err(Error::InvalidRequest(
                "the last message must have role 'user'".into(),
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::InvalidRequest(format!(
                    "'temperature' must be between 0 and 2, got {t}"
                )));
            }
        }

        if let Some(max) = self.max_tokens {
            if max == 0 || max > max_tokens_limit {
                return Err(Error::InvalidRequest(format!(
                    "'max_tokens' must be between 1 and {max_tokens_limit}, got {max}"
                )));
            }
        }

        Ok(())
    }

    /// The latest user turn (the query used for memory and retrieval lookups).
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}
