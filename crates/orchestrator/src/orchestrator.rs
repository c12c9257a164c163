//! Request orchestrator — validate, assemble context, route, stream.
//!
//! The completion id is generated once when a request starts and is reused
//! for every chunk and the final outcome. Routing happens before any output
//! so a request that cannot be served fails with a plain error rather than
//! a broken stream.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::completion::{
    ChatCompletion, Choice, CompletionChunk, CompletionId, FinishReason, OutcomeError,
    RequestOutcome, UsageRecord,
};
use synapse_core::error::{Error, ProviderError};
use synapse_core::memory::MemoryBackend;
use synapse_core::message::{ChatRequest, Message};
use synapse_core::provider::{ProviderRequest, Usage};
use synapse_core::retrieval::DocumentIndex;
use synapse_providers::{ProviderRouter, Routed};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::context::token::estimate_tokens;
use crate::context::{AssembledContext, AssemblerSettings, ContextAssembler};
use crate::streamer::{CompletionStreamer, Sink, StreamReport};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// User id when neither the request nor the identity header names one.
    pub default_user: String,
    pub default_temperature: f32,
    pub max_tokens_limit: u32,
    /// Chunks buffered between the streamer and the transport.
    pub chunk_buffer: usize,
    pub idle_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_user: "default".into(),
            default_temperature: 0.7,
            max_tokens_limit: 32768,
            chunk_buffer: 32,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_user: config.default_user.clone(),
            default_temperature: config.generation.default_temperature,
            max_tokens_limit: config.generation.max_tokens_limit,
            chunk_buffer: config.streaming.buffer,
            idle_timeout: Duration::from_secs(config.streaming.idle_timeout_secs),
        }
    }
}

/// A live streamed completion.
///
/// `chunks` yields the wire sequence; `outcome` resolves once the stream has
/// finished, failed, or been abandoned by the consumer.
pub struct CompletionStream {
    pub id: CompletionId,
    pub created: i64,
    pub model: String,
    pub chunks: mpsc::Receiver<CompletionChunk>,
    pub outcome: JoinHandle<RequestOutcome>,
}

/// Everything a request needs before output starts.
struct Prepared {
    id: CompletionId,
    model: String,
    context: AssembledContext,
    routed: Routed,
}

pub struct Orchestrator {
    assembler: ContextAssembler,
    router: Arc<ProviderRouter>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        assembler: ContextAssembler,
        router: Arc<ProviderRouter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            assembler,
            router,
            settings,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        router: Arc<ProviderRouter>,
        memory: Arc<dyn MemoryBackend>,
        documents: Arc<dyn DocumentIndex>,
    ) -> Self {
        let assembler = ContextAssembler::new(memory, documents, AssemblerSettings::from(config));
        Self::new(assembler, router, OrchestratorSettings::from(config))
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Explicit user field, else the identity header, else the default.
    pub fn resolve_user_id(&self, request_user: Option<&str>, header_user: Option<&str>) -> String {
        [request_user, header_user]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|u| !u.is_empty())
            .unwrap_or(self.settings.default_user.as_str())
            .to_string()
    }

    /// Serve a request as one buffered response.
    pub async fn complete(
        &self,
        request: ChatRequest,
        header_user: Option<&str>,
    ) -> Result<ChatCompletion, Error> {
        let prepared = self.prepare(&request, header_user, false).await?;
        let Prepared {
            id,
            model,
            context,
            routed,
        } = prepared;

        let mut sink = Sink::buffered();
        let report = CompletionStreamer::new(self.settings.idle_timeout)
            .run(routed.source, &mut sink)
            .await;

        if !report.is_done() {
            let error = report
                .upstream_error
                .clone()
                .unwrap_or_else(|| ProviderError::StreamInterrupted("response ended early".into()));
            self.router.record_failure(&routed.provider, &error);
            warn!(
                completion_id = %id,
                provider = %routed.provider,
                error = %error,
                "Completion failed after the provider accepted it"
            );
            return Err(Error::Provider(error));
        }

        let usage = usage_for(&context, &report);
        let finish_reason = report.finish_reason.unwrap_or(FinishReason::Stop);
        info!(
            completion_id = %id,
            provider = %routed.provider,
            prompt_tokens = usage.prompt_tokens(),
            completion_tokens = usage.completion_tokens(),
            total_tokens = usage.total_tokens(),
            degraded = context.degraded,
            "Completion finished"
        );

        Ok(ChatCompletion {
            id,
            model,
            created: Utc::now().timestamp(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(report.content),
                finish_reason,
            }],
            usage,
        })
    }

    /// Serve a request as a live chunk stream.
    ///
    /// Errors before the provider accepts the call are returned directly.
    /// Once this returns `Ok`, failures surface only through the outcome.
    pub async fn stream(
        &self,
        request: ChatRequest,
        header_user: Option<&str>,
    ) -> Result<CompletionStream, Error> {
        let Prepared {
            id,
            model,
            context,
            routed,
        } = self.prepare(&request, header_user, true).await?;

        let created = Utc::now().timestamp();
        let (tx, chunks) = mpsc::channel(self.settings.chunk_buffer.max(1));
        let streamer = CompletionStreamer::new(self.settings.idle_timeout);
        let router = self.router.clone();
        let task_id = id.clone();
        let task_model = model.clone();

        let outcome = tokio::spawn(async move {
            let provider = routed.provider;
            let mut sink = Sink::Live(tx);
            let report = streamer.run(routed.source, &mut sink).await;
            let usage = usage_for(&context, &report);

            match report.error {
                None => {
                    info!(
                        completion_id = %task_id,
                        provider = %provider,
                        chunks = report.chunks_emitted,
                        prompt_tokens = usage.prompt_tokens(),
                        completion_tokens = usage.completion_tokens(),
                        total_tokens = usage.total_tokens(),
                        degraded = context.degraded,
                        "Stream finished"
                    );
                    RequestOutcome::Completed(ChatCompletion {
                        id: task_id,
                        model: task_model,
                        created,
                        choices: vec![Choice {
                            index: 0,
                            message: Message::assistant(report.content),
                            finish_reason: report.finish_reason.unwrap_or(FinishReason::Stop),
                        }],
                        usage,
                    })
                }
                Some(error) => {
                    if let Some(upstream) = &report.upstream_error {
                        router.record_failure(&provider, upstream);
                    } else if error == OutcomeError::IdleTimeout {
                        router.record_failure(
                            &provider,
                            &ProviderError::Timeout("no fragment within the idle timeout".into()),
                        );
                    }
                    warn!(
                        completion_id = %task_id,
                        provider = %provider,
                        outcome = error.as_str(),
                        chunks = report.chunks_emitted,
                        "Stream ended without completing"
                    );
                    RequestOutcome::Terminated {
                        id: task_id,
                        model: task_model,
                        error,
                        chunks_emitted: report.chunks_emitted,
                        usage,
                    }
                }
            }
        });

        Ok(CompletionStream {
            id,
            created,
            model,
            chunks,
            outcome,
        })
    }

    async fn prepare(
        &self,
        request: &ChatRequest,
        header_user: Option<&str>,
        stream: bool,
    ) -> Result<Prepared, Error> {
        let id = CompletionId::new();
        request.validate(self.settings.max_tokens_limit)?;
        let user_id = self.resolve_user_id(request.user.as_deref(), header_user);

        let context = self.assembler.assemble(request, &user_id).await?;
        let upstream = ProviderRequest {
            model: request.model.clone(),
            messages: context.to_messages(),
            temperature: request
                .temperature
                .unwrap_or(self.settings.default_temperature),
            max_tokens: request.max_tokens,
            stream,
        };

        info!(
            completion_id = %id,
            user_id = %user_id,
            model = %request.model,
            stream,
            context_tokens = context.total_cost,
            "Routing request"
        );
        let routed = self.router.route(&upstream, stream).await?;

        Ok(Prepared {
            id,
            model: request.model.clone(),
            context,
            routed,
        })
    }
}

/// Provider-reported counts when present, else local estimates.
fn usage_for(context: &AssembledContext, report: &StreamReport) -> UsageRecord {
    let estimated_prompt = u32::try_from(context.total_cost).unwrap_or(u32::MAX);
    let estimated_completion =
        u32::try_from(estimate_tokens(&report.content)).unwrap_or(u32::MAX);
    match report.usage {
        Some(Usage {
            prompt_tokens,
            completion_tokens,
            ..
        }) => UsageRecord::new(prompt_tokens, completion_tokens),
        None => UsageRecord::new(estimated_prompt, estimated_completion),
    }
}
