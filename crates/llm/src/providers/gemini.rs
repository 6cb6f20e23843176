use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{count, Completion, LlmError, LlmProvider, Message, Role, Usage};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    json_response: bool,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            json_response: false,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Request `application/json` output via `responseMimeType`.
    pub fn with_json_response(mut self, enabled: bool) -> Self {
        self.json_response = enabled;
        self
    }

    /// Build the request body for the Gemini generateContent API.
    fn build_request_body(
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        json_response: bool,
    ) -> Value {
        // Gemini uses a separate system_instruction field (like Claude)
        let system_msg = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.clone());

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| !matches!(m.role, Role::System))
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                        Role::System => unreachable!(),
                    },
                    "parts": parts(m),
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });

        if json_response {
            body["generationConfig"]["responseMimeType"] = json!("application/json");
        }

        if let Some(system) = system_msg {
            body["system_instruction"] = json!({
                "parts": [{ "text": system }],
            });
        }

        body
    }
}

/// Text first, then one `inline_data` part per image.
fn parts(message: &Message) -> Vec<Value> {
    let mut parts = vec![json!({ "text": message.content })];
    parts.extend(message.images.iter().map(|image| {
        json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": image.data,
            }
        })
    }));
    parts
}

fn parse_response(resp: &Value) -> Result<Completion, LlmError> {
    // A candidate may split its reply over several parts.
    let parts = resp["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| LlmError::ParseError("missing candidates[0].content.parts".into()))?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(LlmError::ParseError(
            "missing candidates[0].content.parts[*].text".into(),
        ));
    }

    let meta = &resp["usageMetadata"];
    let usage = count(&meta["promptTokenCount"]).map(|prompt| {
        let completion = count(&meta["candidatesTokenCount"]).unwrap_or(0);
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: count(&meta["totalTokenCount"]).unwrap_or(prompt.saturating_add(completion)),
        }
    });

    Ok(Completion { text, usage })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model, self.api_key,
        );

        let body = Self::build_request_body(&messages, temperature, max_tokens, self.json_response);

        debug!("Gemini request to model={}", self.model);

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
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_structure() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::assistant("Hi there!"),
            Message::user("How are you?"),
        ];

        let body = GeminiProvider::build_request_body(&messages, 0.1, 4096, false);

        // System instruction is separate
        assert_eq!(
            body["system_instruction"]["parts"][0]["text"].as_str().unwrap(),
            "You are helpful.",
        );

        // Contents should not include system message
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Hi there!");
        assert_eq!(contents[2]["parts"][0]["text"], "How are you?");

        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn image_becomes_inline_data_part() {
        let image = crate::provider::ImageInput::from_bytes(b"png-bytes", "image/png");
        let messages = vec![Message::user("What is in this chart?").with_image(image)];

        let body = GeminiProvider::build_request_body(&messages, 0.7, 500, true);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "What is in this chart?");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "cG5nLWJ5dGVz");
    }

    #[test]
    fn test_request_body_json_mode_without_system() {
        let messages = vec![Message::user("User query: hello")];

        let body = GeminiProvider::build_request_body(&messages, 0.7, 2000, true);

        assert!(body.get("system_instruction").is_none());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_response_joins_parts_and_reads_usage() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] } }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 12 }
        });
        let completion = parse_response(&resp).unwrap();
        assert_eq!(completion.text, "Hello, world");
        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        // Total includes thinking tokens, so it is taken as reported.
        assert_eq!(usage.total_tokens, 12);
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let err = parse_response(&json!({ "promptFeedback": {} })).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }
}
