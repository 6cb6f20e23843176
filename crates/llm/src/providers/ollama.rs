use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{count, Completion, LlmError, LlmProvider, Message, Role, Usage};

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    json_response: bool,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model,
            json_response: false,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_json_response(mut self, enabled: bool) -> Self {
        self.json_response = enabled;
        self
    }

    fn build_request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let mut message = json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                });
                if !m.images.is_empty() {
                    message["images"] = m.images.iter().map(|i| json!(i.data)).collect();
                }
                message
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        if self.json_response {
            body["format"] = json!("json");
        }

        body
    }
}

fn parse_response(resp: &Value) -> Result<Completion, LlmError> {
    let text = resp["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError("missing message.content".into()))?
        .to_string();

    let usage = match (count(&resp["prompt_eval_count"]), count(&resp["eval_count"])) {
        (Some(prompt), Some(completion)) => Some(Usage::from_counts(prompt, completion)),
        _ => None,
    };

    Ok(Completion { text, usage })
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let url = format!("{}/api/chat", self.url);
        let body = self.build_request_body(&messages, temperature, max_tokens);

        debug!("Ollama request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: Value = response.json().await?;
        parse_response(&resp)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
