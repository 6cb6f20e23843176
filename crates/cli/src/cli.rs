use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Summarize documents and chat with hosted LLMs.
///
/// Provider credentials and defaults come from the environment (and `.env`);
/// flags override them for one invocation.
#[derive(Parser, Debug)]
#[command(name = "distill", version, about)]
pub struct CliArgs {
    /// LLM provider: openai, gemini, anthropic, or ollama
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model name override (uses the provider's configured model if not set)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Config profile; keys resolve as {PROFILE}_{KEY} before {KEY}
    #[arg(long, global = true, env = "DISTILL_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk a document, summarize each chunk, and combine the summaries
    Summarize(SummarizeArgs),
    /// Interactive chat loop
    Chat(ChatArgs),
    /// One-shot question (optionally about an image) with JSON-normalized answer
    Ask(AskArgs),
    /// Print the resolved configuration (secrets redacted) and known profiles
    Config,
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Read the document from a file (default: stdin)
    #[arg(long, short, conflicts_with_all = ["text", "url"])]
    pub file: Option<PathBuf>,

    /// Use this text as the document
    #[arg(long, conflicts_with = "url")]
    pub text: Option<String>,

    /// Fetch a web page and summarize its visible text
    #[arg(long)]
    pub url: Option<String>,

    #[command(flatten)]
    pub tuning: SummaryTuning,

    /// Print each chunk summary before the combined summary
    #[arg(long)]
    pub show_chunks: bool,

    /// Print token usage per request
    #[arg(long)]
    pub show_usage: bool,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Pipeline overrides shared by `summarize` and `chat --summarize`.
#[derive(Args, Debug, Clone, Default)]
pub struct SummaryTuning {
    /// Maximum chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters each chunk shares with the previous one
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Chunk requests in flight at once (1 = sequential)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// System prompt for the conversation
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Read the system prompt from a file
    #[arg(long, conflicts_with = "system_prompt")]
    pub system_prompt_file: Option<PathBuf>,

    /// Summarize each input instead of chatting
    #[arg(long)]
    pub summarize: bool,

    #[command(flatten)]
    pub tuning: SummaryTuning,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question
    pub query: String,

    /// Image to ask about (png, jpg, jpeg, webp, gif)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// JSON field holding the answer
    #[arg(long, default_value = "response")]
    pub json_field: String,

    /// System prompt override
    #[arg(long)]
    pub system_prompt: Option<String>,
}
