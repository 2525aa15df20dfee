//! HTTP chat-completion stage.
//!
//! Supports OpenAI and Anthropic APIs, selected via environment variables.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chain::{GenerationChain, GenerationStage, StageInput};
use crate::error::{SessionError, SessionResult};

const MAX_RETRIES: u32 = 3;
const MAX_TOKENS: u32 = 8192;

/// Prompt used when no prompts directory exists.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You write small browser games as React + TypeScript + Vite projects. \
Reply with every file of the project. Start each file with a header line of the form \
`=== path/to/file ===` followed by the file content. Always include src/App.tsx and src/main.tsx.";

/// LLM provider type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

/// Chat-completion client.
pub struct LlmClient {
    provider: LlmProvider,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, api_key: String, model: Option<String>) -> Self {
        let default_model = match provider {
            LlmProvider::OpenAI => "gpt-4o".to_string(),
            LlmProvider::Anthropic => "claude-sonnet-4-5".to_string(),
        };

        Self {
            provider,
            api_key,
            model: model.unwrap_or(default_model),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from environment variables
    ///
    /// Checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    pub fn from_env(model: Option<String>) -> SessionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), model)
    }

    pub fn from_lookup<F>(lookup: F, model: Option<String>) -> SessionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            return Ok(Self::new(LlmProvider::OpenAI, api_key, model));
        }
        if let Some(api_key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            return Ok(Self::new(LlmProvider::Anthropic, api_key, model));
        }
        Err(SessionError::LlmNotConfigured)
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Complete one system + user exchange.
    pub async fn complete(&self, system: &str, user: &str) -> SessionResult<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 2s, 4s
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }

            let request = match self.provider {
                LlmProvider::OpenAI => self
                    .client
                    .post("https://api.openai.com/v1/chat/completions")
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&OpenAIRequest {
                        model: self.model.clone(),
                        messages: vec![
                            ChatMessage::new("system", system),
                            ChatMessage::new("user", user),
                        ],
                        max_completion_tokens: Some(MAX_TOKENS),
                    }),
                LlmProvider::Anthropic => self
                    .client
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&AnthropicRequest {
                        model: self.model.clone(),
                        max_tokens: MAX_TOKENS,
                        system: Some(system.to_string()),
                        messages: vec![ChatMessage::new("user", user)],
                    }),
            };

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(SessionError::Llm(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "{:?} API error {} (attempt {}/{})",
                    self.provider,
                    status,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(SessionError::Llm(format!("API error {}: {}", status, body)));
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SessionError::Llm(format!("API error {}: {}", status, body)));
            }

            let content = match self.provider {
                LlmProvider::OpenAI => response
                    .json::<OpenAIResponse>()
                    .await
                    .map_err(|e| SessionError::Llm(format!("Failed to parse response: {}", e)))?
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content),
                LlmProvider::Anthropic => response
                    .json::<AnthropicResponse>()
                    .await
                    .map_err(|e| SessionError::Llm(format!("Failed to parse response: {}", e)))?
                    .content
                    .into_iter()
                    .next()
                    .map(|c| c.text),
            };
            return content.ok_or_else(|| SessionError::Llm("Empty response".to_string()));
        }

        Err(last_error.unwrap_or_else(|| SessionError::Llm("Max retries exceeded".to_string())))
    }
}

/// Stage backed by an [`LlmClient`] and an opaque system prompt.
pub struct LlmStage {
    name: String,
    system_prompt: String,
    client: Arc<LlmClient>,
}

impl LlmStage {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, client: Arc<LlmClient>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            client,
        }
    }
}

#[async_trait]
impl GenerationStage for LlmStage {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn generate(&self, input: StageInput) -> SessionResult<String> {
        self.client.complete(&self.system_prompt, &input.render()).await
    }
}

/// Stage name for a prompt file: its stem without a leading `NN-` prefix.
pub fn stage_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.split_once('-') {
        Some((prefix, rest)) if !rest.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => {
            rest.to_string()
        }
        _ => stem,
    }
}

/// Prompt files (`.md` / `.txt`) in `dir`, sorted by file name.
pub fn load_prompts(dir: &Path) -> SessionResult<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
        })
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|path| Ok((stage_name(&path), fs::read_to_string(&path)?)))
        .collect()
}

/// One LLM stage per prompt file, or a single default stage.
pub fn chain_from_prompts(dir: &Path, client: Arc<LlmClient>) -> SessionResult<GenerationChain> {
    let prompts = load_prompts(dir)?;
    let mut chain = GenerationChain::new();

    if prompts.is_empty() {
        info!("No prompts in {:?}, using the built-in prompt", dir);
        return Ok(chain.with_stage(Arc::new(LlmStage::new(
            "generate",
            DEFAULT_SYSTEM_PROMPT,
            client,
        ))));
    }

    for (name, prompt) in prompts {
        chain = chain.with_stage(Arc::new(LlmStage::new(name, prompt, client.clone())));
    }
    info!("Loaded generation chain: {}", chain.stage_names().join(" -> "));
    Ok(chain)
}

// Wire types
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}
