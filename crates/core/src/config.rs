use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f32(profile: &str, key: &str, default: f32) -> f32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub summary: SummaryConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &[
    "LLM_PROVIDER",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "ANTHROPIC_API_KEY",
    "OLLAMA_URL",
];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DISTILL_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DISTILL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            chunking: ChunkingConfig::from_env_profiled(p),
            summary: SummaryConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  llm:       provider={}, model={}", self.llm.provider, self.llm.model());
        tracing::info!(
            "  chunking:  size={}, overlap={}, separators={}",
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            self.chunking.separators.len()
        );
        tracing::info!(
            "  summary:   chunk_max_tokens={}, combine_max_tokens={}, concurrency={}",
            self.summary.chunk_max_tokens,
            self.summary.combine_max_tokens,
            self.summary.concurrency
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.model(),
                "temperature": self.llm.temperature,
                "max_tokens": self.llm.max_tokens,
                "timeout_secs": self.llm.timeout_secs,
                "configured": self.llm.is_configured(),
            },
            "chunking": {
                "chunk_size": self.chunking.chunk_size,
                "chunk_overlap": self.chunking.chunk_overlap,
                "separators": self.chunking.separators,
            },
            "summary": {
                "chunk_max_tokens": self.summary.chunk_max_tokens,
                "combine_max_tokens": self.summary.combine_max_tokens,
                "concurrency": self.summary.concurrency,
                "chunk_prompt_path": self.summary.chunk_prompt_path,
                "combine_prompt_path": self.summary.combine_prompt_path,
            },
        })
    }
}

// ── LLM providers ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "gemini", "anthropic", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// OpenAI-compatible endpoint (OpenRouter, Hugging Face router, ...).
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "openai").to_lowercase(),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: profiled_env_or(p, "OPENAI_BASE_URL", "https://api.openai.com"),
            gemini_api_key: profiled_env_opt(p, "GEMINI_API_KEY"),
            gemini_model: profiled_env_or(p, "GEMINI_MODEL", "gemini-2.5-flash"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            ollama_model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
            temperature: profiled_env_f32(p, "LLM_TEMPERATURE", 0.7),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 2000),
            timeout_secs: profiled_env_u32(p, "LLM_TIMEOUT_SECS", 300) as u64,
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "gemini" | "google" => self.gemini_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    /// Model name for the active provider.
    pub fn model(&self) -> &str {
        match self.provider.as_str() {
            "gemini" | "google" => &self.gemini_model,
            "anthropic" | "claude" => &self.anthropic_model,
            "ollama" => &self.ollama_model,
            _ => &self.openai_model,
        }
    }

    /// Override the model of the active provider.
    pub fn set_model(&mut self, model: String) {
        match self.provider.as_str() {
            "gemini" | "google" => self.gemini_model = model,
            "anthropic" | "claude" => self.anthropic_model = model,
            "ollama" => self.ollama_model = model,
            _ => self.openai_model = model,
        }
    }
}

// ── Chunking ──────────────────────────────────────────────────

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared with the previous chunk.
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl ChunkingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let separators = profiled_env_opt(p, "CHUNK_SEPARATORS")
            .map(|raw| parse_separators(&raw))
            .unwrap_or_else(default_separators);
        Self {
            chunk_size: profiled_env_usize(p, "CHUNK_SIZE", 500),
            chunk_overlap: profiled_env_usize(p, "CHUNK_OVERLAP", 100),
            separators,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            separators: default_separators(),
        }
    }
}

pub fn default_separators() -> Vec<String> {
    DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect()
}

/// Parse a comma-separated separator list. `\n`, `\t` and `\,` are unescaped;
/// an empty entry is the hard-cut separator.
pub fn parse_separators(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('t') => current.push('\t'),
                Some('s') => current.push(' '),
                Some(',') => current.push(','),
                Some('\\') => current.push('\\'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ',' => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

// ── Summary pipeline ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub chunk_max_tokens: u32,
    pub combine_max_tokens: u32,
    /// Maximum chunk requests in flight (1 = strictly sequential).
    pub concurrency: usize,
    pub chunk_prompt_path: Option<PathBuf>,
    pub combine_prompt_path: Option<PathBuf>,
}

impl SummaryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            chunk_max_tokens: profiled_env_u32(p, "SUMMARY_CHUNK_MAX_TOKENS", 2000),
            combine_max_tokens: profiled_env_u32(p, "SUMMARY_COMBINE_MAX_TOKENS", 3000),
            concurrency: profiled_env_usize(p, "SUMMARY_CONCURRENCY", 1).max(1),
            chunk_prompt_path: profiled_env_opt(p, "SUMMARY_CHUNK_PROMPT_PATH").map(PathBuf::from),
            combine_prompt_path: profiled_env_opt(p, "SUMMARY_COMBINE_PROMPT_PATH")
                .map(PathBuf::from),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 2000,
            combine_max_tokens: 3000,
            concurrency: 1,
            chunk_prompt_path: None,
            combine_prompt_path: None,
        }
    }
}
