//! Integration tests for the map/reduce summary pipeline.
//!
//! A scripted provider stands in for the remote model: it answers chunk
//! requests with a summary derived from the chunk label and combine requests
//! with a digest of the joined chunk summaries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use distill_llm::{Completion, LlmError, LlmProvider, Message, Role, Usage};
use distill_summarize::{
    ChunkerConfig, PipelineConfig, PipelineError, SummaryPipeline, UsageScope,
};

struct MockProvider {
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
    /// Chunk index whose request fails with a rate-limit error.
    fail_chunk: Option<usize>,
    /// Fail the combine request instead.
    fail_combine: bool,
    /// Later chunks answer faster, so completion order is reversed.
    reverse_latency: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_chunk: None,
            fail_combine: false,
            reverse_latency: false,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Parse `Chunk: N | Content: ...` back into N.
fn chunk_label(input: &str) -> Option<usize> {
    let rest = input.strip_prefix("Chunk: ")?;
    let (n, _) = rest.split_once(" | Content: ")?;
    n.parse().ok()
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.clone());

        let input = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(index) = chunk_label(&input) {
            if self.fail_chunk == Some(index) {
                return Err(LlmError::ApiError { status: 429, body: "slow down".into() });
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.reverse_latency {
                tokio::time::sleep(Duration::from_millis(50 / index as u64)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            return Ok(Completion {
                text: format!("summary of chunk {index}"),
                usage: Some(Usage::from_counts(100, 10)),
            });
        }

        if self.fail_combine {
            return Err(LlmError::ParseError("missing choices[0].message.content".into()));
        }

        let body = input.strip_prefix("All chunk summaries: ").unwrap_or(&input);
        Ok(Completion {
            text: format!("overall [{}]", body.replace('\n', "; ")),
            usage: Some(Usage::from_counts(50, 20)),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn config(max_size: usize, overlap: usize, concurrency: usize) -> PipelineConfig {
    PipelineConfig {
        chunker: ChunkerConfig {
            max_size,
            overlap,
            ..Default::default()
        },
        concurrency,
        ..Default::default()
    }
}

fn long_document() -> String {
    (1..=60)
        .map(|i| format!("Sentence number {i} talks about topic {}.", i % 7))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn single_chunk_document_makes_two_calls() {
    let provider = Arc::new(MockProvider::new());
    let pipeline = SummaryPipeline::new(provider.clone(), config(500, 100, 1)).unwrap();

    let report = pipeline.run("A. B. C.").await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(report.chunk_summaries.len(), 1);
    assert_eq!(report.combined, "overall [summary of chunk 1]");

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(requests[0][1].content, "Chunk: 1 | Content: A. B. C.");
    assert_eq!(requests[1][1].content, "All chunk summaries: summary of chunk 1");
}

#[tokio::test]
async fn n_chunks_make_n_plus_one_calls_in_order() {
    let provider = Arc::new(MockProvider::new());
    let pipeline = SummaryPipeline::new(provider.clone(), config(300, 60, 1)).unwrap();
    let document = long_document();
    let chunk_count = pipeline.splitter().split(&document).len();
    assert!(chunk_count > 2);

    let report = pipeline.run(&document).await.unwrap();

    assert_eq!(provider.calls(), chunk_count + 1);
    assert_eq!(report.chunk_summaries.len(), chunk_count);
    for (i, summary) in report.chunk_summaries.iter().enumerate() {
        assert_eq!(summary.index, i + 1);
        assert_eq!(summary.text, format!("summary of chunk {}", i + 1));
    }

    // One usage record per chunk, in index order, then the combine step.
    assert_eq!(report.usage.len(), chunk_count + 1);
    assert_eq!(report.usage[0].scope, UsageScope::Chunk(1));
    assert_eq!(report.usage.last().unwrap().scope, UsageScope::AllChunks);
    assert_eq!(
        report.total_usage().total_tokens,
        (110 * chunk_count + 70) as u32
    );

    // Each request carries its own chunk only; instructions never accumulate.
    let requests = provider.requests.lock().unwrap();
    assert!(requests.iter().all(|r| r.len() == 2));
}

#[tokio::test]
async fn parallel_run_keeps_index_order() {
    let document = long_document();

    let sequential = Arc::new(MockProvider::new());
    let expected = SummaryPipeline::new(sequential.clone(), config(300, 60, 1))
        .unwrap()
        .run(&document)
        .await
        .unwrap();
    assert_eq!(sequential.max_in_flight.load(Ordering::SeqCst), 1);

    let mut provider = MockProvider::new();
    provider.reverse_latency = true;
    let provider = Arc::new(provider);
    let report = SummaryPipeline::new(provider.clone(), config(300, 60, 4))
        .unwrap()
        .run(&document)
        .await
        .unwrap();

    assert!(provider.max_in_flight.load(Ordering::SeqCst) > 1);
    assert_eq!(report.chunk_summaries, expected.chunk_summaries);
    assert_eq!(report.combined, expected.combined);
    assert_eq!(report.usage, expected.usage);
}

#[tokio::test]
async fn failing_chunk_aborts_run() {
    let mut provider = MockProvider::new();
    provider.fail_chunk = Some(2);
    let provider = Arc::new(provider);
    let pipeline = SummaryPipeline::new(provider.clone(), config(300, 60, 1)).unwrap();

    let err = pipeline.run(&long_document()).await.unwrap_err();

    match err {
        PipelineError::Chunk { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(source, LlmError::ApiError { status: 429, .. }));
        }
        other => panic!("expected chunk failure, got {other:?}"),
    }
    // Sequential run stops at the failing chunk; the combine step never runs.
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn failing_chunk_aborts_parallel_run() {
    let mut provider = MockProvider::new();
    provider.fail_chunk = Some(2);
    provider.reverse_latency = true;
    let provider = Arc::new(provider);
    let pipeline = SummaryPipeline::new(provider.clone(), config(300, 60, 4)).unwrap();
    let document = long_document();
    let chunk_count = pipeline.splitter().split(&document).len();

    let err = pipeline.run(&document).await.unwrap_err();

    match err {
        PipelineError::Chunk { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(source, LlmError::ApiError { status: 429, .. }));
        }
        other => panic!("expected chunk failure, got {other:?}"),
    }
    // Chunk calls may already be in flight, but the combine step never runs.
    assert!(provider.calls() <= chunk_count);
    let requests = provider.requests.lock().unwrap();
    assert!(requests
        .iter()
        .all(|r| !r[1].content.starts_with("All chunk summaries: ")));
}

#[tokio::test]
async fn failing_combine_yields_no_summary() {
    let mut provider = MockProvider::new();
    provider.fail_combine = true;
    let pipeline = SummaryPipeline::new(Arc::new(provider), config(500, 100, 1)).unwrap();

    let err = pipeline.run("A. B. C.").await.unwrap_err();
    assert!(matches!(err, PipelineError::Combine(LlmError::ParseError(_))));
}

#[tokio::test]
async fn empty_document_makes_no_calls() {
    let provider = Arc::new(MockProvider::new());
    let pipeline = SummaryPipeline::new(provider.clone(), config(500, 100, 1)).unwrap();

    let err = pipeline.run("").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyDocument));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let provider = Arc::new(MockProvider::new());
    let pipeline = SummaryPipeline::new(provider, config(300, 60, 2)).unwrap();
    let document = long_document();

    let first = pipeline.run(&document).await.unwrap();
    let second = pipeline.run(&document).await.unwrap();
    assert_eq!(first.combined, second.combined);
    assert_eq!(first, second);
}

/// Replies with fenced JSON, the way JSON-mode models often do.
struct FencedProvider;

#[async_trait]
impl LlmProvider for FencedProvider {
    async fn complete(
        &self,
        _messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        Ok(Completion {
            text: "```json\n{\"summary\": \"clean text\"}\n```".into(),
            usage: None,
        })
    }

    fn name(&self) -> &str {
        "fenced"
    }
}

#[tokio::test]
async fn fenced_json_replies_are_normalized() {
    let pipeline = SummaryPipeline::new(Arc::new(FencedProvider), config(500, 100, 1)).unwrap();
    let report = pipeline.run("Short document.").await.unwrap();

    assert_eq!(report.chunk_summaries[0].text, "clean text");
    assert_eq!(report.combined, "clean text");
    // No usage reported, no records.
    assert!(report.usage.is_empty());
}
