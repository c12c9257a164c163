//! Completion streamer — turns upstream output into the client-facing chunk
//! sequence.
//!
//! A well-formed stream is one role chunk, zero or more content chunks, and
//! one terminal chunk. A stream that ends in error stops where it is: no
//! terminal chunk follows.

use std::time::Duration;
use synapse_core::completion::{CompletionChunk, FinishReason, OutcomeError};
use synapse_core::error::ProviderError;
use synapse_core::message::Role;
use synapse_core::provider::{StreamChunk, Usage};
use synapse_providers::FragmentSource;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    RoleSent,
    Streaming,
    Done,
    Error,
}

/// The consumer was gone when a chunk was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Where chunks go.
pub enum Sink {
    /// A live consumer; a closed receiver means the client went away.
    Live(mpsc::Sender<CompletionChunk>),
    /// Collected in memory, for non-streamed responses.
    Buffered(Vec<CompletionChunk>),
}

impl Sink {
    pub fn buffered() -> Self {
        Self::Buffered(Vec::new())
    }

    pub async fn emit(&mut self, chunk: CompletionChunk) -> Result<(), Disconnected> {
        match self {
            Self::Live(tx) => tx.send(chunk).await.map_err(|_| Disconnected),
            Self::Buffered(chunks) => {
                chunks.push(chunk);
                Ok(())
            }
        }
    }

    /// Resolves once the consumer has gone away. Never resolves for a
    /// buffered sink.
    pub async fn closed(&self) {
        match self {
            Self::Live(tx) => tx.closed().await,
            Self::Buffered(_) => std::future::pending().await,
        }
    }

    pub fn into_chunks(self) -> Vec<CompletionChunk> {
        match self {
            Self::Live(_) => Vec::new(),
            Self::Buffered(chunks) => chunks,
        }
    }
}

/// What happened while streaming one completion.
#[derive(Debug)]
pub struct StreamReport {
    pub state: StreamState,
    /// Concatenation of every content chunk emitted.
    pub content: String,
    pub chunks_emitted: usize,
    pub finish_reason: Option<FinishReason>,
    /// Usage reported by the provider, if any.
    pub usage: Option<Usage>,
    pub error: Option<OutcomeError>,
    pub upstream_error: Option<ProviderError>,
}

impl StreamReport {
    fn new() -> Self {
        Self {
            state: StreamState::Init,
            content: String::new(),
            chunks_emitted: 0,
            finish_reason: None,
            usage: None,
            error: None,
            upstream_error: None,
        }
    }

    fn fail(mut self, error: OutcomeError) -> Self {
        self.state = StreamState::Error;
        self.error = Some(error);
        self
    }

    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }
}

pub struct CompletionStreamer {
    idle_timeout: Duration,
}

impl CompletionStreamer {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub async fn run(&self, source: FragmentSource, sink: &mut Sink) -> StreamReport {
        let mut report = StreamReport::new();

        if sink.emit(CompletionChunk::role(Role::Assistant)).await.is_err() {
            return report.fail(OutcomeError::ClientCancelled);
        }
        report.state = StreamState::RoleSent;

        let finish = match source {
            FragmentSource::Buffered(response) => {
                for piece in word_fragments(&response.content) {
                    if emit_content(sink, &mut report, piece).await.is_err() {
                        return report.fail(OutcomeError::ClientCancelled);
                    }
                }
                report.usage = response.usage;
                response.finish_reason
            }
            FragmentSource::Streaming { first, mut rest } => {
                let mut pending = Some(first);
                loop {
                    let chunk = match pending.take() {
                        Some(chunk) => chunk,
                        None => {
                            let next = tokio::select! {
                                biased;
                                _ = sink.closed() => {
                                    return report.fail(OutcomeError::ClientCancelled);
                                }
                                next = tokio::time::timeout(self.idle_timeout, rest.recv()) => next,
                            };
                            match next {
                                Err(_) => return report.fail(OutcomeError::IdleTimeout),
                                Ok(None) => {
                                    report.upstream_error = Some(ProviderError::StreamInterrupted(
                                        "upstream closed without finishing".into(),
                                    ));
                                    return report.fail(OutcomeError::UpstreamFailed);
                                }
                                Ok(Some(Err(e))) => {
                                    report.upstream_error = Some(e);
                                    return report.fail(OutcomeError::UpstreamFailed);
                                }
                                Ok(Some(Ok(chunk))) => chunk,
                            }
                        }
                    };

                    if let Some(finish) = self.apply(sink, &mut report, chunk).await {
                        match finish {
                            Ok(reason) => break reason,
                            Err(Disconnected) => {
                                return report.fail(OutcomeError::ClientCancelled);
                            }
                        }
                    }
                }
            }
        };

        if sink.emit(CompletionChunk::terminal(finish)).await.is_err() {
            return report.fail(OutcomeError::ClientCancelled);
        }
        report.finish_reason = Some(finish);
        report.state = StreamState::Done;
        report
    }

    /// Forward one upstream fragment. Returns `Some` once the stream should
    /// stop: the finish reason, or the consumer being gone.
    async fn apply(
        &self,
        sink: &mut Sink,
        report: &mut StreamReport,
        chunk: StreamChunk,
    ) -> Option<Result<FinishReason, Disconnected>> {
        if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty())
            && let Err(e) = emit_content(sink, report, text).await
        {
            return Some(Err(e));
        }
        if chunk.usage.is_some() {
            report.usage = chunk.usage;
        }
        if chunk.done || chunk.finish_reason.is_some() {
            return Some(Ok(chunk.finish_reason.unwrap_or(FinishReason::Stop)));
        }
        None
    }
}

async fn emit_content(
    sink: &mut Sink,
    report: &mut StreamReport,
    text: &str,
) -> Result<(), Disconnected> {
    sink.emit(CompletionChunk::content(text)).await?;
    report.content.push_str(text);
    report.chunks_emitted += 1;
    report.state = StreamState::Streaming;
    Ok(())
}

/// Split text into word-sized pieces whose concatenation is exactly the
/// input. Whitespace stays attached to the word before it.
pub fn word_fragments(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut seen_word = false;
    let mut after_space = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            after_space = seen_word;
        } else if after_space {
            pieces.push(&text[start..i]);
            start = i;
            after_space = false;
        } else {
            seen_word = true;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::message::Message;
    use synapse_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use synapse_providers::MockProvider;

    fn response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: text.into(),
            finish_reason: FinishReason::Stop,
            usage: None,
            model: "m".into(),
        }
    }

    fn streaming_source(
        first: StreamChunk,
    ) -> (
        mpsc::Sender<Result<StreamChunk, ProviderError>>,
        FragmentSource,
    ) {
        let (tx, rest) = mpsc::channel(8);
        (tx, FragmentSource::Streaming { first, rest })
    }

    fn streamer() -> CompletionStreamer {
        CompletionStreamer::new(Duration::from_secs(5))
    }

    fn assert_well_formed(chunks: &[CompletionChunk]) {
        assert_eq!(chunks[0], CompletionChunk::role(Role::Assistant));
        let last = chunks.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.delta, Default::default());
        for c in &chunks[1..chunks.len() - 1] {
            assert!(c.delta.role.is_none());
            assert!(c.delta.content.as_deref().is_some_and(|t| !t.is_empty()));
            assert!(!c.is_terminal());
        }
    }

    #[test]
    fn word_fragments_concatenate_exactly() {
        let text = "  Hello,  world!\nHow are\tyou? ";
        let pieces = word_fragments(text);
        assert_eq!(pieces.concat(), text);
        assert_eq!(pieces[0], "  Hello,  ");
        assert_eq!(pieces.last(), Some(&"you? "));
        assert!(word_fragments("").is_empty());
        assert_eq!(word_fragments("one"), vec!["one"]);
    }

    #[tokio::test]
    async fn buffered_source_is_chunked() {
        let mut sink = Sink::buffered();
        let report = streamer()
            .run(FragmentSource::Buffered(response("The answer is 42.")), &mut sink)
            .await;
        assert!(report.is_done());
        assert_eq!(report.content, "The answer is 42.");
        assert_eq!(report.chunks_emitted, 4);
        assert_eq!(report.finish_reason, Some(FinishReason::Stop));

        let chunks = sink.into_chunks();
        assert_eq!(chunks.len(), 6);
        assert_well_formed(&chunks);
    }

    #[tokio::test]
    async fn empty_reply_is_role_then_terminal() {
        let mut sink = Sink::buffered();
        let report = streamer()
            .run(FragmentSource::Buffered(response("")), &mut sink)
            .await;
        assert!(report.is_done());
        assert_eq!(report.chunks_emitted, 0);
        let chunks = sink.into_chunks();
        assert_eq!(chunks.len(), 2);
        assert_well_formed(&chunks);
    }

    #[tokio::test]
    async fn streaming_source_forwards_fragments_in_order() {
        let (tx, source) = streaming_source(StreamChunk::text("Hel"));
        tx.send(Ok(StreamChunk::text(""))).await.unwrap();
        tx.send(Ok(StreamChunk::text("lo"))).await.unwrap();
        tx.send(Ok(StreamChunk::finished(
            FinishReason::Length,
            Some(Usage {
                prompt_tokens: 7,
                completion_tokens: 2,
                total_tokens: 9,
            }),
        )))
        .await
        .unwrap();

        let mut sink = Sink::buffered();
        let report = streamer().run(source, &mut sink).await;
        assert!(report.is_done());
        assert_eq!(report.content, "Hello");
        assert_eq!(report.chunks_emitted, 2);
        assert_eq!(report.finish_reason, Some(FinishReason::Length));
        assert_eq!(report.usage.map(|u| u.prompt_tokens), Some(7));

        let chunks = sink.into_chunks();
        assert_well_formed(&chunks);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].finish_reason, Some(FinishReason::Length));
    }

    #[tokio::test]
    async fn upstream_error_ends_without_terminal() {
        let (tx, source) = streaming_source(StreamChunk::text("partial "));
        tx.send(Err(ProviderError::StreamInterrupted("reset".into())))
            .await
            .unwrap();

        let mut sink = Sink::buffered();
        let report = streamer().run(source, &mut sink).await;
        assert_eq!(report.state, StreamState::Error);
        assert_eq!(report.error, Some(OutcomeError::UpstreamFailed));
        assert!(matches!(
            report.upstream_error,
            Some(ProviderError::StreamInterrupted(_))
        ));
        assert_eq!(report.chunks_emitted, 1);

        let chunks = sink.into_chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.is_terminal()));
    }

    #[tokio::test]
    async fn upstream_closing_early_is_a_failure() {
        let (tx, source) = streaming_source(StreamChunk::text("cut"));
        drop(tx);
        let mut sink = Sink::buffered();
        let report = streamer().run(source, &mut sink).await;
        assert_eq!(report.error, Some(OutcomeError::UpstreamFailed));
        assert!(sink.into_chunks().iter().all(|c| !c.is_terminal()));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_upstream_times_out() {
        let (_tx, source) = streaming_source(StreamChunk::text("waiting"));
        let mut sink = Sink::buffered();
        let report = CompletionStreamer::new(Duration::from_secs(3))
            .run(source, &mut sink)
            .await;
        assert_eq!(report.error, Some(OutcomeError::IdleTimeout));
        assert_eq!(report.chunks_emitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_disconnect_stops_upstream() {
        let provider = MockProvider::endless("p", Duration::from_millis(10));
        let mut rest = provider
            .stream(ProviderRequest {
                model: "m".into(),
                messages: vec![Message::user("go")],
                temperature: 0.7,
                max_tokens: None,
                stream: true,
            })
            .await
            .unwrap();
        let first = rest.recv().await.unwrap().unwrap();
        let source = FragmentSource::Streaming { first, rest };

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let mut sink = Sink::Live(tx);
            streamer().run(source, &mut sink).await
        });

        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        drop(rx);

        let report = handle.await.unwrap();
        assert_eq!(report.error, Some(OutcomeError::ClientCancelled));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let produced = provider.fragments_produced();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.fragments_produced(), produced);
    }
}
