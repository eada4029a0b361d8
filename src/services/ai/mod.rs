pub mod openai;
pub mod prompt;

use async_trait::async_trait;

use crate::models::ConversationMessage;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends the system prompt followed by `messages`, in order, and returns
    /// the assistant's reply text.
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ConversationMessage],
    ) -> anyhow::Result<String>;
}
