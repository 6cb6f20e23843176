use std::sync::Arc;

use distill_core::{Config, DistillError};
use distill_llm::normalize::normalize_response;
use distill_llm::{complete_with, LlmError, LlmProvider, Usage};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::chunker::{Chunk, ChunkError, ChunkerConfig, TextSplitter};
use crate::prompts::SummaryPrompts;

/// JSON field a summary may be wrapped in when the model answers with JSON.
const SUMMARY_FIELD: &str = "summary";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunker: ChunkerConfig,
    pub prompts: SummaryPrompts,
    pub chunk_max_tokens: u32,
    pub combine_max_tokens: u32,
    pub temperature: f32,
    /// Maximum chunk requests in flight; 1 keeps the calls strictly sequential.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            prompts: SummaryPrompts::default(),
            chunk_max_tokens: 2000,
            combine_max_tokens: 3000,
            temperature: 0.7,
            concurrency: 1,
        }
    }
}

impl PipelineConfig {
    /// Build from the loaded environment config, reading prompt files if set.
    pub fn from_config(config: &Config) -> Result<Self, DistillError> {
        let prompts = SummaryPrompts::load(
            config.summary.chunk_prompt_path.as_deref(),
            config.summary.combine_prompt_path.as_deref(),
        )?;
        Ok(Self {
            chunker: ChunkerConfig::from(&config.chunking),
            prompts,
            chunk_max_tokens: config.summary.chunk_max_tokens,
            combine_max_tokens: config.summary.combine_max_tokens,
            temperature: config.llm.temperature,
            concurrency: config.summary.concurrency.max(1),
        })
    }
}

/// Summary of exactly one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageScope {
    Chunk(usize),
    AllChunks,
}

impl std::fmt::Display for UsageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageScope::Chunk(index) => write!(f, "chunk {index}"),
            UsageScope::AllChunks => f.write_str("all chunks"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub scope: UsageScope,
    pub usage: Usage,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// In chunk index order.
    pub chunk_summaries: Vec<ChunkSummary>,
    pub combined: String,
    /// Chunk records in index order, then the combine record.
    pub usage: Vec<UsageRecord>,
}

impl SummaryReport {
    pub fn total_usage(&self) -> Usage {
        self.usage.iter().fold(Usage::default(), |acc, r| Usage {
            prompt_tokens: acc.prompt_tokens.saturating_add(r.usage.prompt_tokens),
            completion_tokens: acc.completion_tokens.saturating_add(r.usage.completion_tokens),
            total_tokens: acc.total_tokens.saturating_add(r.usage.total_tokens),
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid chunker settings: {0}")]
    Chunking(#[from] ChunkError),
    #[error("document is empty, nothing to summarize")]
    EmptyDocument,
    #[error("summarizing chunk {index} failed: {source}")]
    Chunk {
        index: usize,
        #[source]
        source: LlmError,
    },
    #[error("combining chunk summaries failed: {0}")]
    Combine(#[source] LlmError),
}

/// State owned by a single run; dropped when the run ends.
#[derive(Default)]
struct RunContext {
    summaries: Vec<ChunkSummary>,
    usage: Vec<UsageRecord>,
}

impl RunContext {
    fn record(&mut self, scope: UsageScope, usage: Option<Usage>) {
        if let Some(usage) = usage {
            self.usage.push(UsageRecord { scope, usage });
        }
    }
}

/// Map/reduce summarizer over one completion provider.
pub struct SummaryPipeline {
    provider: Arc<dyn LlmProvider>,
    splitter: TextSplitter,
    config: PipelineConfig,
}

impl SummaryPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PipelineConfig) -> Result<Self, PipelineError> {
        let splitter = TextSplitter::new(config.chunker.clone())?;
        Ok(Self {
            provider,
            splitter,
            config,
        })
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Chunk `document`, summarize every chunk, then combine the summaries.
    ///
    /// All-or-nothing: the first failed completion aborts the run.
    pub async fn run(&self, document: &str) -> Result<SummaryReport, PipelineError> {
        let chunks = self.splitter.split(document);
        info!(
            chars = document.chars().count(),
            chunks = chunks.len(),
            provider = self.provider.name(),
            "starting summary run"
        );
        self.summarize_chunks(&chunks).await
    }

    /// Run both phases over an already chunked document.
    pub async fn summarize_chunks(&self, chunks: &[Chunk]) -> Result<SummaryReport, PipelineError> {
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let mut ctx = RunContext::default();

        // Phase 1: `buffered` yields in input order, whatever order calls finish in.
        let results: Vec<(ChunkSummary, Option<Usage>)> = stream::iter(chunks)
            .map(|chunk| self.summarize_chunk(chunk))
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        for (summary, usage) in results {
            ctx.record(UsageScope::Chunk(summary.index), usage);
            ctx.summaries.push(summary);
        }
        info!(summaries = ctx.summaries.len(), "chunk summaries complete");

        // Phase 2
        let joined = ctx
            .summaries
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let completion = complete_with(
            self.provider.as_ref(),
            &self.config.prompts.combine,
            format!("All chunk summaries: {joined}"),
            self.config.combine_max_tokens,
            self.config.temperature,
        )
        .await
        .map_err(PipelineError::Combine)?;
        ctx.record(UsageScope::AllChunks, completion.usage);

        let combined = normalize_response(&completion.text, SUMMARY_FIELD).text;
        info!(chars = combined.chars().count(), "combined summary complete");

        Ok(SummaryReport {
            chunk_summaries: ctx.summaries,
            combined,
            usage: ctx.usage,
        })
    }

    async fn summarize_chunk(
        &self,
        chunk: &Chunk,
    ) -> Result<(ChunkSummary, Option<Usage>), PipelineError> {
        debug!(index = chunk.index, chars = chunk.char_len(), "summarizing chunk");
        let completion = complete_with(
            self.provider.as_ref(),
            &self.config.prompts.chunk,
            format!("Chunk: {} | Content: {}", chunk.index, chunk.text),
            self.config.chunk_max_tokens,
            self.config.temperature,
        )
        .await
        .map_err(|source| PipelineError::Chunk {
            index: chunk.index,
            source,
        })?;

        let summary = ChunkSummary {
            index: chunk.index,
            text: normalize_response(&completion.text, SUMMARY_FIELD).text,
        };
        Ok((summary, completion.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_scope_labels() {
        assert_eq!(UsageScope::Chunk(3).to_string(), "chunk 3");
        assert_eq!(UsageScope::AllChunks.to_string(), "all chunks");
    }

    #[test]
    fn total_usage_sums_records() {
        let report = SummaryReport {
            chunk_summaries: vec![],
            combined: String::new(),
            usage: vec![
                UsageRecord { scope: UsageScope::Chunk(1), usage: Usage::from_counts(10, 5) },
                UsageRecord { scope: UsageScope::AllChunks, usage: Usage::from_counts(7, 3) },
            ],
        };
        assert_eq!(report.total_usage(), Usage::from_counts(17, 8));
    }

    #[test]
    fn total_usage_saturates_on_clamped_counts() {
        let huge = Usage::from_counts(u32::MAX, u32::MAX);
        let report = SummaryReport {
            chunk_summaries: vec![],
            combined: String::new(),
            usage: vec![
                UsageRecord { scope: UsageScope::Chunk(1), usage: huge },
                UsageRecord { scope: UsageScope::AllChunks, usage: huge },
            ],
        };
        let total = report.total_usage();
        assert_eq!(total.prompt_tokens, u32::MAX);
        assert_eq!(total.total_tokens, u32::MAX);
    }

    #[test]
    fn invalid_chunker_config_is_reported() {
        struct Never;
        #[async_trait::async_trait]
        impl LlmProvider for Never {
            async fn complete(
                &self,
                _: Vec<distill_llm::Message>,
                _: f32,
                _: u32,
            ) -> Result<distill_llm::Completion, LlmError> {
                unreachable!()
            }
            fn name(&self) -> &str {
                "never"
            }
        }

        let config = PipelineConfig {
            chunker: ChunkerConfig { max_size: 10, overlap: 20, ..Default::default() },
            ..Default::default()
        };
        let err = SummaryPipeline::new(Arc::new(Never), config).err().unwrap();
        assert!(matches!(err, PipelineError::Chunking(ChunkError::OverlapTooLarge { .. })));
    }
}
