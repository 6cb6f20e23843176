use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{count, Completion, LlmError, LlmProvider, Message, Role, Usage};

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        // Claude API uses separate system parameter
        let system_msg = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.clone());

        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| !matches!(m.role, Role::System))
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::System => unreachable!(),
                    },
                    "content": content_blocks(m),
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        if let Some(system) = system_msg {
            body["system"] = json!(system);
        }

        body
    }
}

/// Image blocks ahead of the text block.
fn content_blocks(message: &Message) -> Vec<Value> {
    let mut blocks: Vec<Value> = message
        .images
        .iter()
        .map(|image| {
            json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.mime_type,
                    "data": image.data,
                }
            })
        })
        .collect();
    blocks.push(json!({ "type": "text", "text": message.content }));
    blocks
}

fn parse_response(resp: &Value) -> Result<Completion, LlmError> {
    let text = resp["content"][0]["text"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError("missing content[0].text".into()))?
        .trim()
        .to_string();

    let usage = match (
        count(&resp["usage"]["input_tokens"]),
        count(&resp["usage"]["output_tokens"]),
    ) {
        (Some(input), Some(output)) => Some(Usage::from_counts(input, output)),
        _ => None,
    };

    Ok(Completion { text, usage })
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let url = "https://api.anthropic.com/v1/messages";
        let body = self.build_request_body(&messages, temperature, max_tokens);

        debug!("Claude request to {}", url);

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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
        "anthropic"
    }
}
