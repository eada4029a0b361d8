use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::LlmProvider;
use crate::models::{ConversationMessage, Role};

/// Chat-completions client for any OpenAI-compatible endpoint (DeepSeek by
/// default).
pub struct OpenAiCompatProvider {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build completion HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            client,
        })
    }

    fn request_body(
        &self,
        system_prompt: &str,
        messages: &[ConversationMessage],
    ) -> serde_json::Value {
        let mut chat_messages = vec![json!({
            "role": Role::System.as_str(),
            "content": system_prompt,
        })];

        for msg in messages {
            chat_messages.push(json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            }));
        }

        json!({
            "model": self.model,
            "messages": chat_messages,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ConversationMessage],
    ) -> anyhow::Result<String> {
        let body = self.request_body(system_prompt, messages);

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call completion API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse completion response")?;

        if !status.is_success() {
            anyhow::bail!("completion API error ({}): {}", status, data);
        }

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("missing content in completion response"))
    }
}
