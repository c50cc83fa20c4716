//! Generation backends.
//!
//! Every backend implements [`ProviderAdapter`]. Adapters are looked up by
//! [`ProviderId`] in an [`AdapterRegistry`], so new backends can be added
//! without touching the generation service.

mod completion;

pub use completion::{CompletionAdapter, CompletionProfile};

use crate::config::LlmSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of a generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(Cow<'static, str>);

impl ProviderId {
    /// OpenAI completion API.
    pub const OPENAI: Self = Self(Cow::Borrowed("openai"));
    /// Local Ollama server through its OpenAI-compatible endpoint.
    pub const OLLAMA: Self = Self(Cow::Borrowed("ollama"));
    /// Any OpenAI-compatible completion endpoint given by `apiUrl`.
    pub const CUSTOM: Self = Self(Cow::Borrowed("custom"));
    /// Anthropic. Recognized in settings, no adapter yet.
    pub const ANTHROPIC: Self = Self(Cow::Borrowed("anthropic"));

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(Cow::Owned(id.trim().to_ascii_lowercase()))
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self::from(id.as_str())
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature in `[0, 1]`
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Model identifier
    pub model: String,
}

impl GenerationOptions {
    /// Builds options from backend settings.
    #[must_use]
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            model: settings.model.clone(),
        }
    }
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u64,
    /// Completion tokens
    pub output: u64,
    /// Total tokens
    pub total: u64,
}

/// Outcome of a single generation call.
///
/// Remote failures are reported here instead of being raised, so callers
/// have a single error path.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    success: bool,
    text: Option<String>,
    error_message: Option<String>,
    /// Token usage; zero when the backend did not report it
    pub token_usage: TokenUsage,
}

impl GenerationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(text: impl Into<String>, token_usage: TokenUsage) -> Self {
        Self {
            success: true,
            text: Some(text.into()),
            error_message: None,
            token_usage,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            text: None,
            error_message: Some(message.into()),
            token_usage: TokenUsage::default(),
        }
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Generated text, present on success.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Error message, present on failure.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Converts into the generated text or the error message.
    ///
    /// # Errors
    ///
    /// Returns the error message when the call failed.
    pub fn into_text(self) -> std::result::Result<String, String> {
        match (self.success, self.text, self.error_message) {
            (true, Some(text), _) => Ok(text),
            (_, _, Some(message)) => Err(message),
            _ => Err("Unknown generation error".to_string()),
        }
    }
}

/// Uniform contract for a generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stores credentials and endpoint. Idempotent, performs no I/O.
    fn configure(&mut self, settings: &LlmSettings);

    /// Issues one generation request.
    ///
    /// Never fails: transport and payload errors come back as
    /// [`GenerationResult::failure`].
    async fn generate_response(&self, prompt: &str, options: &GenerationOptions)
    -> GenerationResult;

    /// Sends a minimal probe request and reports whether it succeeded.
    async fn test_connection(&self) -> bool;

    /// Identifier of the backend.
    fn provider_type(&self) -> ProviderId;

    /// Static model catalog, no network call.
    fn available_models(&self) -> Vec<String>;
}

/// Constructor for an unconfigured adapter.
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn ProviderAdapter> + Send + Sync>;

/// Maps provider identifiers to adapter constructors.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<ProviderId, AdapterFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().map(ProviderId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("AdapterRegistry").field("providers", &ids).finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in completion backends.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for profile in [
            CompletionProfile::openai(),
            CompletionProfile::ollama(),
            CompletionProfile::custom(),
        ] {
            let id = profile.id.clone();
            registry.register(id, move || {
                Box::new(CompletionAdapter::new(profile.clone())) as Box<dyn ProviderAdapter>
            });
        }
        registry
    }

    /// Registers (or replaces) the constructor for `id`.
    pub fn register<F>(&mut self, id: impl Into<ProviderId>, factory: F)
    where
        F: Fn() -> Box<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Builds an unconfigured adapter for `id`, if one is registered.
    #[must_use]
    pub fn create(&self, id: &ProviderId) -> Option<Box<dyn ProviderAdapter>> {
        self.factories.get(id).map(|factory| factory())
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.factories.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_normalizes() {
        assert_eq!(ProviderId::from(" OpenAI "), ProviderId::OPENAI);
        assert_eq!(ProviderId::OLLAMA.to_string(), "ollama");
    }

    #[test]
    fn test_result_invariant() {
        let ok = GenerationResult::success("hi", TokenUsage::default());
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some("hi"));
        assert_eq!(ok.error_message(), None);

        let failed = GenerationResult::failure("HTTP 500");
        assert!(!failed.is_success());
        assert_eq!(failed.text(), None);
        assert_eq!(failed.into_text(), Err("HTTP 500".to_string()));
    }

    #[test]
    fn test_default_registry() {
        let registry = AdapterRegistry::with_defaults();

        let ids = registry.providers();
        assert!(ids.contains(&ProviderId::OPENAI));
        assert!(ids.contains(&ProviderId::OLLAMA));
        assert!(ids.contains(&ProviderId::CUSTOM));
        assert!(!ids.contains(&ProviderId::ANTHROPIC));

        let adapter = registry.create(&ProviderId::OLLAMA).unwrap();
        assert_eq!(adapter.provider_type(), ProviderId::OLLAMA);
        assert!(registry.create(&ProviderId::ANTHROPIC).is_none());
    }

    #[test]
    fn test_register_extends_registry() {
        let mut registry = AdapterRegistry::new();
        registry.register("local", || {
            Box::new(CompletionAdapter::new(CompletionProfile::custom())) as Box<dyn ProviderAdapter>
        });

        assert_eq!(registry.providers(), vec![ProviderId::from("local")]);
    }
}
