use super::{GenerationOptions, GenerationResult, ProviderAdapter, ProviderId, TokenUsage};
use crate::config::LlmSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_PROMPT: &str = "Hello";
const PROBE_MAX_TOKENS: u32 = 5;
const ERROR_BODY_LIMIT: usize = 200;

/// Static description of a completion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionProfile {
    /// Provider identifier
    pub id: ProviderId,
    /// Endpoint used when settings carry no `apiUrl`
    pub default_url: Option<&'static str>,
    /// Model catalog
    pub models: &'static [&'static str],
}

impl CompletionProfile {
    /// OpenAI completions endpoint.
    #[must_use]
    pub const fn openai() -> Self {
        Self {
            id: ProviderId::OPENAI,
            default_url: Some("https://api.openai.com/v1/completions"),
            models: &["gpt-3.5-turbo-instruct", "davinci-002", "babbage-002"],
        }
    }

    /// Local Ollama server.
    #[must_use]
    pub const fn ollama() -> Self {
        Self {
            id: ProviderId::OLLAMA,
            default_url: Some("http://localhost:11434/v1/completions"),
            models: &["llama3.1", "mistral", "qwen2.5"],
        }
    }

    /// User-supplied endpoint; `apiUrl` is required.
    #[must_use]
    pub const fn custom() -> Self {
        Self {
            id: ProviderId::CUSTOM,
            default_url: None,
            models: &[],
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl From<CompletionUsage> for TokenUsage {
    fn from(usage: CompletionUsage) -> Self {
        Self {
            input: usage.prompt_tokens.unwrap_or(0),
            output: usage.completion_tokens.unwrap_or(0),
            total: usage.total_tokens.unwrap_or(0),
        }
    }
}

/// HTTP adapter for OpenAI-compatible completion endpoints.
#[derive(Debug, Clone)]
pub struct CompletionAdapter {
    profile: CompletionProfile,
    client: Client,
    api_key: String,
    api_url: Option<String>,
    model: String,
}

impl CompletionAdapter {
    /// Creates an unconfigured adapter for `profile`.
    #[must_use]
    pub fn new(profile: CompletionProfile) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("llm-fill/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            profile,
            client,
            api_key: String::new(),
            api_url: None,
            model: String::new(),
        }
    }

    fn endpoint(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or(self.profile.default_url)
    }

    async fn send(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResult, String> {
        let url = self
            .endpoint()
            .ok_or_else(|| format!("No API URL configured for provider '{}'", self.profile.id))?;

        let body = CompletionRequest {
            model: &options.model,
            prompt,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Request to {url} failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!(
                "API request failed with status {status}: {}",
                truncate(text.trim(), ERROR_BODY_LIMIT)
            ));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|e| format!("Malformed response payload: {e}"))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.text)
            .ok_or_else(|| "Response contained no choices".to_string())?;

        let usage = payload.usage.unwrap_or_default().into();
        Ok(GenerationResult::success(text, usage))
    }
}

#[async_trait]
impl ProviderAdapter for CompletionAdapter {
    fn configure(&mut self, settings: &LlmSettings) {
        self.api_key = settings.api_key.clone();
        self.api_url = settings.api_url.clone();
        self.model = settings.model.clone();
    }

    async fn generate_response(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult {
        match self.send(prompt, options).await {
            Ok(result) => {
                debug!(
                    "Generation succeeded ({} input, {} output tokens)",
                    result.token_usage.input, result.token_usage.output
                );
                result
            }
            Err(message) => {
                warn!("Generation via '{}' failed: {}", self.profile.id, message);
                GenerationResult::failure(message)
            }
        }
    }

    async fn test_connection(&self) -> bool {
        let options = GenerationOptions {
            temperature: 0.0,
            max_tokens: PROBE_MAX_TOKENS,
            model: self.model.clone(),
        };
        self.generate_response(PROBE_PROMPT, &options)
            .await
            .is_success()
    }

    fn provider_type(&self) -> ProviderId {
        self.profile.id.clone()
    }

    fn available_models(&self) -> Vec<String> {
        if self.profile.models.is_empty() {
            return if self.model.is_empty() {
                Vec::new()
            } else {
                vec![self.model.clone()]
            };
        }
        self.profile.models.iter().map(ToString::to_string).collect()
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
