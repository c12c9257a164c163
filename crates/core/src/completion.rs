//! Completion output types: chunks, finished responses, usage, outcomes.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Unique identifier for one chat completion (`chatcmpl-<uuid>`).
///
/// Generated once per request and shared by every chunk of that request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionId(String);

impl CompletionId {
    pub fn new() -> Self {
        Self(format!("chatcmpl-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CompletionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

impl FinishReason {
    /// Map an upstream finish reason onto the three values clients see.
    ///
    /// `tool_calls` and a missing reason count as a normal stop.
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("tool_calls") | Some("end_turn") => Self::Stop,
            Some("length") | Some("max_tokens") => Self::Length,
            Some(_) => Self::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Error => "error",
        }
    }
}

/// Partial message carried by a [`CompletionChunk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One unit of a streamed completion.
///
/// A well-formed stream is one role-only chunk, zero or more content
/// chunks, then exactly one terminal chunk with an empty delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

impl CompletionChunk {
    pub fn role(role: Role) -> Self {
        Self {
            index: 0,
            delta: Delta {
                role: Some(role),
                content: None,
            },
            finish_reason: None,
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            index: 0,
            delta: Delta {
                role: None,
                content: Some(text.into()),
            },
            finish_reason: None,
        }
    }

    pub fn terminal(reason: FinishReason) -> Self {
        Self {
            index: 0,
            delta: Delta::default(),
            finish_reason: Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Token accounting for one request. Immutable once built.
///
/// A deserialized `total_tokens` is ignored and recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UsageParts")]
pub struct UsageRecord {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct UsageParts {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<UsageParts> for UsageRecord {
    fn from(parts: UsageParts) -> Self {
        Self::new(parts.prompt_tokens, parts.completion_tokens)
    }
}

impl UsageRecord {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

/// A finished, non-streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: CompletionId,
    /// Model name echoed back to the client.
    pub model: String,
    /// Unix seconds.
    pub created: i64,
    pub choices: Vec<Choice>,
    pub usage: UsageRecord,
}

/// Why a request ended without a clean completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeError {
    /// The consumer went away mid-stream.
    ClientCancelled,
    /// The provider failed after the call was accepted.
    UpstreamFailed,
    /// No fragment arrived within the idle timeout.
    IdleTimeout,
}

impl OutcomeError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCancelled => "client_cancelled",
            Self::UpstreamFailed => "upstream_failed",
            Self::IdleTimeout => "idle_timeout",
        }
    }
}

/// Final record of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed(ChatCompletion),
    Terminated {
        id: CompletionId,
        model: String,
        error: OutcomeError,
        /// Content chunks already delivered before termination.
        chunks_emitted: usize,
        usage: UsageRecord,
    },
}

impl RequestOutcome {
    pub fn id(&self) -> &CompletionId {
        match self {
            Self::Completed(c) => &c.id,
            Self::Terminated { id, .. } => id,
        }
    }

    pub fn usage(&self) -> UsageRecord {
        match self {
            Self::Completed(c) => c.usage,
            Self::Terminated { usage, .. } => *usage,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
