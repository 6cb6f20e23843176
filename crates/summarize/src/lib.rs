//! Chunked map/reduce summarization.
//!
//! [`TextSplitter`] cuts a document into overlapping, size-bounded chunks;
//! [`SummaryPipeline`] summarizes every chunk and then combines the chunk
//! summaries into one overall summary.

pub mod chunker;
pub mod pipeline;
pub mod prompts;

pub use chunker::{stitch, Chunk, ChunkError, ChunkerConfig, TextSplitter};
pub use pipeline::{
    ChunkSummary, PipelineConfig, PipelineError, SummaryPipeline, SummaryReport, UsageRecord,
    UsageScope,
};
pub use prompts::SummaryPrompts;
