use std::path::Path;

use distill_core::DistillError;
use tracing::debug;

/// Instruction for the per-chunk ("map") step.
pub const DEFAULT_CHUNK_PROMPT: &str = "\
#Role:
    You are an expert summarizer who writes accurate, insightful summaries.

#Objective:
    Summarize the single content chunk you are given, concisely and on its own.

#Instructions:
    1. Every message carries one chunk labeled with its chunk number.
    2. Produce a clear summary with a heading and bullet points.
    3. Aim for 100-200 words unless the user asks for another length.
    4. Preserve meaning, nuance and key points. Do not hallucinate.
    5. Summarize only the chunk provided. Do not mention or restate other chunks.
    6. Do not write an overall summary yet.
";

/// Instruction for the combine ("reduce") step.
pub const DEFAULT_COMBINE_PROMPT: &str = "\
#Role:
    You are an expert summarizer who integrates multi-part content.

#Objective:
    Write one cohesive overall summary from the chunk summaries you are given.

#Instructions:
    1. Aim for around 200 words unless the user asks for another length.
    2. Capture the key arguments, evidence, contrasts and conclusions across all chunks.
    3. Synthesize; do not repeat the individual chunk summaries.
    4. Produce a clear summary with a heading and bullet points.
    5. Preserve meaning and nuance. Do not hallucinate.
";

/// The two fixed instructions used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPrompts {
    pub chunk: String,
    pub combine: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            chunk: DEFAULT_CHUNK_PROMPT.to_string(),
            combine: DEFAULT_COMBINE_PROMPT.to_string(),
        }
    }
}

impl SummaryPrompts {
    /// Built-in prompts, with either one replaced by a file when a path is given.
    pub fn load(
        chunk_path: Option<&Path>,
        combine_path: Option<&Path>,
    ) -> Result<Self, DistillError> {
        let mut prompts = Self::default();
        if let Some(path) = chunk_path {
            prompts.chunk = load_template(path)?;
        }
        if let Some(path) = combine_path {
            prompts.combine = load_template(path)?;
        }
        Ok(prompts)
    }
}

/// Load a prompt template from disk, failing eagerly on empty files.
fn load_template(path: &Path) -> Result<String, DistillError> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(DistillError::EmptyPrompt {
            path: path.display().to_string(),
        });
    }
    debug!(path = %path.display(), "loaded prompt template");
    Ok(content)
}
