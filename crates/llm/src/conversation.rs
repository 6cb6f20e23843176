//! Multi-turn chat state: system prompt, message history and a usage log.

use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message, Role, Usage};

/// Usage reported for one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnUsage {
    pub user_query: String,
    pub usage: Usage,
}

/// A running conversation with one provider.
///
/// History is only appended after a successful reply, so a failed request
/// leaves the conversation exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    usage_log: Vec<TurnUsage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages.retain(|m| m.role != Role::System);
        self.messages.insert(0, Message::system(prompt));
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn usage_log(&self) -> &[TurnUsage] {
        &self.usage_log
    }

    /// Number of user turns so far.
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Send `input` with the full history and return the reply text.
    pub async fn send(
        &mut self,
        provider: &dyn LlmProvider,
        input: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut request = self.messages.clone();
        request.push(Message::user(input));

        debug!(
            provider = provider.name(),
            history = request.len(),
            "sending conversation turn"
        );
        let completion = provider.complete(request, temperature, max_tokens).await?;

        self.messages.push(Message::user(input));
        self.messages.push(Message::assistant(completion.text.clone()));
        if let Some(usage) = completion.usage {
            self.usage_log.push(TurnUsage {
                user_query: input.to_string(),
                usage,
            });
        }

        Ok(completion.text)
    }
}
