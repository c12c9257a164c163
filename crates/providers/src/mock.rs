//! Scriptable in-process providers for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synapse_core::completion::FinishReason;
use synapse_core::error::ProviderError;
use synapse_core::provider::{
    FragmentReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use tokio::sync::mpsc;

#[derive(Clone)]
enum Behavior {
    Fragments(Vec<String>),
    Fail(ProviderError),
    Hang,
    BreakAfter(Vec<String>, ProviderError),
    Endless,
}

/// A provider whose behavior is fixed at construction.
///
/// `complete` joins the scripted fragments; `stream` sends them one by one
/// followed by a terminal fragment.
pub struct MockProvider {
    name: String,
    behavior: Behavior,
    finish: FinishReason,
    usage: Option<Usage>,
    delay: Duration,
    calls: AtomicUsize,
    produced: Arc<AtomicUsize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            finish: FinishReason::Stop,
            usage: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            produced: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` as a single fragment.
    pub fn reply(name: &str, text: &str) -> Self {
        Self::with_behavior(name, Behavior::Fragments(vec![text.to_string()]))
    }

    /// Streams the given fragments in order.
    pub fn streaming(name: &str, fragments: &[&str]) -> Self {
        Self::with_behavior(
            name,
            Behavior::Fragments(fragments.iter().map(|f| f.to_string()).collect()),
        )
    }

    /// Fails every call before producing anything.
    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::with_behavior(name, Behavior::Fail(error))
    }

    /// Never answers.
    pub fn hanging(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Hang)
    }

    /// Streams `fragments`, then fails.
    pub fn broken_stream(name: &str, fragments: &[&str], error: ProviderError) -> Self {
        Self::with_behavior(
            name,
            Behavior::BreakAfter(fragments.iter().map(|f| f.to_string()).collect(), error),
        )
    }

    /// Streams `"tick "` fragments until the receiver goes away.
    pub fn endless(name: &str, delay: Duration) -> Self {
        Self::with_behavior(name, Behavior::Endless).with_delay(delay)
    }

    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.usage = Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
        self
    }

    pub fn with_finish(mut self, finish: FinishReason) -> Self {
        self.finish = finish;
        self
    }

    /// Pause before each streamed fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `complete` + `stream` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fragments actually handed to a stream consumer.
    pub fn fragments_produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn record(&self, request: &ProviderRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.record(&request);
        match &self.behavior {
            Behavior::Fragments(parts) => Ok(ProviderResponse {
                content: parts.concat(),
                finish_reason: self.finish,
                usage: self.usage,
                model: request.model,
            }),
            Behavior::Fail(e) | Behavior::BreakAfter(_, e) => Err(e.clone()),
            Behavior::Hang | Behavior::Endless => std::future::pending().await,
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<FragmentReceiver, ProviderError> {
        self.record(&request);
        let (tx, rx) = mpsc::channel(4);
        let delay = self.delay;
        let produced = self.produced.clone();

        match self.behavior.clone() {
            Behavior::Fail(e) => return Err(e),
            Behavior::Hang => return std::future::pending().await,
            Behavior::Fragments(parts) => {
                let last = StreamChunk::finished(self.finish, self.usage);
                tokio::spawn(async move {
                    for part in parts {
                        tokio::time::sleep(delay).await;
                        if tx.send(Ok(StreamChunk::text(part))).await.is_err() {
                            return;
                        }
                        produced.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = tx.send(Ok(last)).await;
                });
            }
            Behavior::BreakAfter(parts, error) => {
                tokio::spawn(async move {
                    for part in parts {
                        tokio::time::sleep(delay).await;
                        if tx.send(Ok(StreamChunk::text(part))).await.is_err() {
                            return;
                        }
                        produced.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = tx.send(Err(error)).await;
                });
            }
            Behavior::Endless => {
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(delay).await;
                        if tx.send(Ok(StreamChunk::text("tick "))).await.is_err() {
                            return;
                        }
                        produced.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        }

        Ok(rx)
    }
}
