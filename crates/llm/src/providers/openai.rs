use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{count, Completion, LlmError, LlmProvider, Message, Role, Usage};

/// OpenAI-compatible chat completions backend. Works against OpenAI itself and
/// any router exposing `/v1/chat/completions` (OpenRouter, Hugging Face).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    json_response: bool,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            json_response: false,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Ask for a JSON object reply (`response_format: json_object`).
    pub fn with_json_response(mut self, enabled: bool) -> Self {
        self.json_response = enabled;
        self
    }

    fn endpoint(&self) -> String {
        // Routers are usually configured with the `/v1` suffix already.
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    fn build_request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": content(m),
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        if self.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }
}

/// Plain string content, or content parts when images are attached.
fn content(message: &Message) -> Value {
    if message.images.is_empty() {
        return json!(message.content);
    }
    let mut parts = vec![json!({ "type": "text", "text": message.content })];
    parts.extend(message.images.iter().map(|image| {
        json!({ "type": "image_url", "image_url": { "url": image.data_url() } })
    }));
    Value::Array(parts)
}

fn parse_response(resp: &Value) -> Result<Completion, LlmError> {
    let text = resp["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))?
        .to_string();

    let usage = &resp["usage"];
    let usage = match (count(&usage["prompt_tokens"]), count(&usage["completion_tokens"])) {
        (Some(prompt), Some(completion)) => Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: count(&usage["total_tokens"]).unwrap_or(prompt.saturating_add(completion)),
        }),
        _ => None,
    };

    Ok(Completion { text, usage })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let url = self.endpoint();
        let body = self.build_request_body(&messages, temperature, max_tokens);

        debug!("OpenAI request to {} (model={})", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
        "openai"
    }
}
