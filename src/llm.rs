use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AutomlError;

/// Which decision a prompt is asking the reasoning collaborator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    TargetSelection,
    FeatureProposal,
    FeatureCritique,
    Synthesis,
    SynthesisRepair,
    Explain,
    Routing,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::TargetSelection => "target_selection",
            CallSite::FeatureProposal => "feature_proposal",
            CallSite::FeatureCritique => "feature_critique",
            CallSite::Synthesis => "synthesis",
            CallSite::SynthesisRepair => "synthesis_repair",
            CallSite::Explain => "explain",
            CallSite::Routing => "routing",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One system + user prompt pair.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub site: CallSite,
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(site: CallSite, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            site,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Text-completion oracle. Calls block the caller until the completion
/// arrives; there is no internal timeout.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434/v1".to_string());
        let model = dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gpt-oss:20b".to_string());
        let max_tokens = dotenv::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(4096);
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            max_tokens,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        endpoint_for(&self.base_url)
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AutomlError::Collaborator(format!("LLM request failed: {}", e)))?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            return Err(AutomlError::Collaborator(format!("LLM HTTP {}: {}", status, text)).into());
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;

        let message = json["choices"].get(0).map(|c| &c["message"]);

        // Reasoning models may put their chain of thought beside the content.
        if let Some(reasoning) = message
            .and_then(|m| m["reasoning_content"].as_str().or(m["reasoning"].as_str()))
        {
            debug!(reasoning_len = reasoning.len(), "─── LLM Reasoning ───");
            for line in reasoning.lines().take(20) {
                debug!("  │ {}", line);
            }
        }

        // Extract content from choices[0].message.content (handle null)
        let content = message
            .and_then(|m| m["content"].as_str())
            .or_else(|| json["choices"].get(0).and_then(|c| c["text"].as_str()))
            .unwrap_or("")
            .to_string();

        if content.is_empty() {
            warn!("LLM returned no content");
        }
        Ok(content)
    }
}

fn endpoint_for(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

#[async_trait]
impl Oracle for LlmClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let messages = vec![
            Message {
                role: "system".to_string(),
                content: prompt.system.clone(),
            },
            Message {
                role: "user".to_string(),
                content: prompt.user.clone(),
            },
        ];
        debug!(site = %prompt.site, user_len = prompt.user.len(), "LLM request");
        let response = self.chat(&messages).await?;
        debug!(site = %prompt.site, response_len = response.len(), "─── LLM Response ───");
        for line in response.lines().take(50) {
            debug!("  │ {}", line);
        }
        Ok(response)
    }
}
