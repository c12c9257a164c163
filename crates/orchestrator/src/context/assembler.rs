//! Context assembler — merges system instructions, memory recall, retrieved
//! documents, and conversation history into one prompt within a token
//! budget.
//!
//! Lookups against the memory store and document index run concurrently
//! and are non-fatal: a failed or slow collaborator contributes nothing and
//! flags the context as degraded. Composition itself is pure, so the same
//! request and the same lookup results always give the same context.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::error::Error;
use synapse_core::memory::{MemoryBackend, Snippet};
use synapse_core::message::{ChatRequest, Message, Role};
use synapse_core::retrieval::DocumentIndex;
use tracing::{debug, warn};

use crate::context::token::{estimate_tokens, MESSAGE_OVERHEAD};

const MEMORY_HEADER: &str = "[Memory]";
const RETRIEVAL_HEADER: &str = "[Retrieved Knowledge]";

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOrigin {
    System,
    Memory,
    Retrieval,
    History,
}

impl BlockOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Memory => "memory",
            Self::Retrieval => "retrieval",
            Self::History => "history",
        }
    }
}

/// One unit of assembled context. Blocks are never split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    pub origin: BlockOrigin,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Estimated tokens, message overhead included.
    pub cost: usize,
}

impl ContextBlock {
    fn new(origin: BlockOrigin, role: Role, content: String, source: Option<String>) -> Self {
        let cost = estimate_tokens(&content) + MESSAGE_OVERHEAD;
        Self {
            origin,
            role,
            content,
            source,
            cost,
        }
    }

    /// A memory or retrieval snippet, costed as its rendered bullet line
    /// plus the newline joining it to the next.
    fn snippet(origin: BlockOrigin, content: String, source: Option<String>) -> Self {
        let cost = estimate_tokens(&bullet(&content, source.as_deref())) + 1;
        Self {
            origin,
            role: Role::System,
            content,
            source,
            cost,
        }
    }
}

fn bullet(content: &str, source: Option<&str>) -> String {
    match source {
        Some(src) => format!("- ({src}) {content}"),
        None => format!("- {content}"),
    }
}

/// Tokens for a section header and the blank line separating it from the
/// previous section.
fn header_cost(header: &str) -> usize {
    estimate_tokens(&format!("\n\n{header}\n"))
}

/// What was left out of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropInfo {
    pub origin: BlockOrigin,
    pub blocks_dropped: usize,
    pub tokens_dropped: usize,
}

/// The prompt for one request, within budget.
///
/// Block order: system, memory, retrieval, then history in chronological
/// order ending with the latest user turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub blocks: Vec<ContextBlock>,
    /// Block costs plus section overhead; never above `budget`.
    pub total_cost: usize,
    /// Section headers, and the system message they open when no system
    /// block exists.
    pub overhead: usize,
    pub budget: usize,
    /// A memory or retrieval lookup failed or timed out.
    pub degraded: bool,
    pub drops: Vec<DropInfo>,
}

impl AssembledContext {
    pub fn blocks_of(&self, origin: BlockOrigin) -> impl Iterator<Item = &ContextBlock> {
        self.blocks.iter().filter(move |b| b.origin == origin)
    }

    /// Render as provider messages: a single system message carrying
    /// instructions plus memory and retrieval sections, then the history.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut sections: Vec<String> = self
            .blocks_of(BlockOrigin::System)
            .map(|b| b.content.clone())
            .collect();

        for (origin, header) in [
            (BlockOrigin::Memory, MEMORY_HEADER),
            (BlockOrigin::Retrieval, RETRIEVAL_HEADER),
        ] {
            let lines: Vec<String> = self
                .blocks_of(origin)
                .map(|b| bullet(&b.content, b.source.as_deref()))
                .collect();
            if !lines.is_empty() {
                sections.push(format!("{header}\n{}", lines.join("\n")));
            }
        }

        let mut messages = Vec::with_capacity(self.blocks.len());
        if !sections.is_empty() {
            messages.push(Message::system(sections.join("\n\n")));
        }
        messages.extend(
            self.blocks_of(BlockOrigin::History)
                .map(|b| Message::new(b.role, b.content.clone())),
        );
        messages
    }
}

/// Assembly limits.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub budget: usize,
    pub system_prompt: String,
    pub memory_top_k: usize,
    pub retrieval_top_k: usize,
    pub lookup_timeout: Duration,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            budget: 8192,
            system_prompt: String::new(),
            memory_top_k: 5,
            retrieval_top_k: 5,
            lookup_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&AppConfig> for AssemblerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            budget: config.context.budget_tokens,
            system_prompt: config.context.system_prompt.clone(),
            memory_top_k: config.context.memory_top_k,
            retrieval_top_k: config.context.retrieval_top_k,
            lookup_timeout: Duration::from_millis(config.context.lookup_timeout_ms),
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    memory: Arc<dyn MemoryBackend>,
    documents: Arc<dyn DocumentIndex>,
    settings: AssemblerSettings,
}

impl ContextAssembler {
    pub fn new(
        memory: Arc<dyn MemoryBackend>,
        documents: Arc<dyn DocumentIndex>,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            memory,
            documents,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    /// Look up memory and documents for the latest user turn, then compose.
    pub async fn assemble(
        &self,
        request: &ChatRequest,
        user_id: &str,
    ) -> Result<AssembledContext, Error> {
        let query = request
            .latest_user_message()
            .map(|m| m.content.as_str())
            .ok_or_else(|| Error::InvalidRequest("no user message to answer".into()))?;

        // Fail fast before calling collaborators.
        let (system, latest, _) = split_request(&self.settings, request);
        check_mandatory(&system, latest.as_ref(), self.settings.budget)?;

        let limit = self.settings.lookup_timeout;
        let (memory, documents) = tokio::join!(
            async {
                if self.settings.memory_top_k == 0 {
                    return Ok(Vec::new());
                }
                match tokio::time::timeout(
                    limit,
                    self.memory.recall(user_id, query, self.settings.memory_top_k),
                )
                .await
                {
                    Ok(Ok(s)) => Ok(s),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {limit:?}")),
                }
            },
            async {
                if self.settings.retrieval_top_k == 0 {
                    return Ok(Vec::new());
                }
                match tokio::time::timeout(
                    limit,
                    self.documents.search(query, self.settings.retrieval_top_k),
                )
                .await
                {
                    Ok(Ok(s)) => Ok(s),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {limit:?}")),
                }
            }
        );

        let mut degraded = false;
        let memory = memory.unwrap_or_else(|e| {
            warn!(user_id, backend = self.memory.name(), error = %e, "Memory lookup failed, continuing without it");
            degraded = true;
            Vec::new()
        });
        let documents = documents.unwrap_or_else(|e| {
            warn!(index = self.documents.name(), error = %e, "Document search failed, continuing without it");
            degraded = true;
            Vec::new()
        });

        let context = compose(&self.settings, request, &memory, &documents, degraded)?;
        debug!(
            user_id,
            total_cost = context.total_cost,
            budget = context.budget,
            blocks = context.blocks.len(),
            degraded,
            "Context assembled"
        );
        Ok(context)
    }
}

/// System blocks, the latest user turn, and the prior history.
fn split_request(
    settings: &AssemblerSettings,
    request: &ChatRequest,
) -> (Vec<ContextBlock>, Option<ContextBlock>, Vec<ContextBlock>) {
    let mut system = Vec::new();
    if !settings.system_prompt.trim().is_empty() {
        system.push(ContextBlock::new(
            BlockOrigin::System,
            Role::System,
            settings.system_prompt.clone(),
            None,
        ));
    }

    let mut turns = Vec::new();
    for m in &request.messages {
        let block = |origin| ContextBlock::new(origin, m.role, m.content.clone(), None);
        match m.role {
            Role::System => system.push(block(BlockOrigin::System)),
            _ => turns.push(block(BlockOrigin::History)),
        }
    }

    // Validation guarantees the conversation ends with a user turn.
    let latest = match turns.last() {
        Some(b) if b.role == Role::User => turns.pop(),
        _ => None,
    };
    (system, latest, turns)
}

fn check_mandatory(
    system: &[ContextBlock],
    latest: Option<&ContextBlock>,
    budget: usize,
) -> Result<usize, Error> {
    let required = system.iter().map(|b| b.cost).sum::<usize>() + latest.map_or(0, |b| b.cost);
    if required > budget {
        return Err(Error::ContextBudgetExceeded { required, budget });
    }
    Ok(required)
}

/// Greedily take ranked blocks while they fit; stop at the first that
/// does not. `header` is charged together with the first block taken.
/// Returns the blocks taken and what was dropped.
fn fill(
    candidates: Vec<ContextBlock>,
    origin: BlockOrigin,
    header: usize,
    remaining: &mut usize,
    overhead: &mut usize,
) -> (Vec<ContextBlock>, Option<DropInfo>) {
    let mut taken = Vec::new();
    let mut iter = candidates.into_iter();
    for block in iter.by_ref() {
        let extra = if taken.is_empty() { header } else { 0 };
        if block.cost + extra > *remaining {
            let rest: Vec<_> = std::iter::once(block).chain(iter).collect();
            let drop = DropInfo {
                origin,
                blocks_dropped: rest.len(),
                tokens_dropped: rest.iter().map(|b| b.cost).sum(),
            };
            return (taken, Some(drop));
        }
        *remaining -= block.cost + extra;
        *overhead += extra;
        taken.push(block);
    }
    (taken, None)
}

fn snippet_blocks(snippets: &[Snippet], origin: BlockOrigin) -> Vec<ContextBlock> {
    snippets
        .iter()
        .filter(|s| !s.content.trim().is_empty())
        .map(|s| ContextBlock::snippet(origin, s.content.clone(), s.source.clone()))
        .collect()
}

/// Build the context from already-fetched lookup results.
pub fn compose(
    settings: &AssemblerSettings,
    request: &ChatRequest,
    memory: &[Snippet],
    documents: &[Snippet],
    degraded: bool,
) -> Result<AssembledContext, Error> {
    let (system, latest, history) = split_request(settings, request);
    let required = check_mandatory(&system, latest.as_ref(), settings.budget)?;
    let mut remaining = settings.budget - required;
    let mut overhead = 0;
    let mut drops = Vec::new();

    // The first section to be rendered opens the system message when no
    // system block did.
    let opens_message = |overhead: usize| {
        if system.is_empty() && overhead == 0 {
            MESSAGE_OVERHEAD
        } else {
            0
        }
    };

    let (memory, drop) = fill(
        snippet_blocks(memory, BlockOrigin::Memory),
        BlockOrigin::Memory,
        header_cost(MEMORY_HEADER) + opens_message(overhead),
        &mut remaining,
        &mut overhead,
    );
    drops.extend(drop);

    let (retrieval, drop) = fill(
        snippet_blocks(documents, BlockOrigin::Retrieval),
        BlockOrigin::Retrieval,
        header_cost(RETRIEVAL_HEADER) + opens_message(overhead),
        &mut remaining,
        &mut overhead,
    );
    drops.extend(drop);

    // Newest first so the oldest turns are the ones dropped.
    let (mut kept_history, drop) = fill(
        history.into_iter().rev().collect(),
        BlockOrigin::History,
        0,
        &mut remaining,
        &mut overhead,
    );
    drops.extend(drop);
    kept_history.reverse();

    let mut blocks = system;
    blocks.extend(memory);
    blocks.extend(retrieval);
    blocks.extend(kept_history);
    blocks.extend(latest);

    let total_cost = blocks.iter().map(|b| b.cost).sum::<usize>() + overhead;
    Ok(AssembledContext {
        blocks,
        total_cost,
        overhead,
        budget: settings.budget,
        degraded,
        drops,
    })
}
