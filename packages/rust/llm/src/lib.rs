//! Chat-completions client used to draft asset descriptions.
//!
//! Speaks the OpenAI-compatible `POST {base_url}/chat/completions` protocol,
//! so OpenAI, Azure OpenAI deployments behind a compatible gateway and
//! OpenRouter all work by changing `[llm] base_url`.

use std::time::Duration;

use assetsync_shared::{AssetSyncError, LlmConfig, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

/// System message for description requests.
pub const SYSTEM_PROMPT: &str =
    "You are a data governance expert who creates clear, professional asset descriptions.";

/// User prompt asking for a short description of one asset.
pub fn description_prompt(asset_name: &str, asset_fqn: &str, existing: &str) -> String {
    format!(
        "You are a data governance expert. Please generate a clear, professional description \
         for the following data asset:\n\
         \n\
         Asset Name: {asset_name}\n\
         Asset Qualified Name: {asset_fqn}\n\
         Current Description: {existing}\n\
         \n\
         Please provide a comprehensive description that includes:\n\
         1. What type of data this asset likely contains based on its name\n\
         2. Its potential business purpose or use case\n\
         3. Any relevant technical details inferred from the qualified name\n\
         \n\
         Keep the description concise but informative (2-3 sentences maximum)."
    )
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub base_url: Url,
    api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl ChatOptions {
    /// Build options from `[llm]` and an already-resolved API key.
    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let raw = config.base_url.trim();
        let base_url = Url::parse(raw)
            .map_err(|e| AssetSyncError::config(format!("invalid llm base_url '{raw}': {e}")))?;

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

pub struct ChatClient {
    opts: ChatOptions,
    http: Client,
}

impl ChatClient {
    pub fn new(opts: ChatOptions) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| AssetSyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { opts, http })
    }

    pub fn options(&self) -> &ChatOptions {
        &self.opts
    }

    /// One system + user exchange; returns the trimmed reply text.
    #[instrument(skip_all, fields(model = %self.opts.model))]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.opts.base_url.as_str().trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.opts.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.opts.max_tokens,
            temperature: self.opts.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.opts.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssetSyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssetSyncError::upstream("chat completion", status.as_u16(), body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssetSyncError::parse(format!("invalid chat completion: {e}")))?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AssetSyncError::Enrichment("completion had no content".into()))?;

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }

    /// Draft a description for one asset.
    pub async fn describe_asset(
        &self,
        asset_name: &str,
        asset_fqn: &str,
        existing: &str,
    ) -> Result<String> {
        self.complete(
            SYSTEM_PROMPT,
            &description_prompt(asset_name, asset_fqn, existing),
        )
        .await
    }
}
