pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use distill_core::config::LlmConfig;

use crate::provider::{LlmError, LlmProvider};

/// Reply format requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the backend for a JSON object where it supports a JSON mode.
    Json,
}

/// Create the appropriate LLM provider based on config.
pub fn create_provider(
    llm_config: &LlmConfig,
    format: ResponseFormat,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(llm_config.timeout_secs))
        .build()?;
    let json_response = format == ResponseFormat::Json;

    match llm_config.provider.as_str() {
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            Ok(Arc::new(
                openai::OpenAiProvider::new(
                    api_key.clone(),
                    llm_config.openai_model.clone(),
                    llm_config.openai_base_url.clone(),
                )
                .with_client(client)
                .with_json_response(json_response),
            ))
        }
        "gemini" | "google" => {
            let api_key = llm_config
                .gemini_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("GEMINI_API_KEY not set".into()))?;
            Ok(Arc::new(
                gemini::GeminiProvider::new(api_key.clone(), llm_config.gemini_model.clone())
                    .with_client(client)
                    .with_json_response(json_response),
            ))
        }
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            Ok(Arc::new(
                claude::ClaudeProvider::new(api_key.clone(), llm_config.anthropic_model.clone())
                    .with_client(client),
            ))
        }
        "ollama" => Ok(Arc::new(
            ollama::OllamaProvider::new(
                llm_config.ollama_url.clone(),
                llm_config.ollama_model.clone(),
            )
            .with_client(client)
            .with_json_response(json_response),
        )),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
