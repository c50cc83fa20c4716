use crate::{
    config::{LlmSettings, Settings},
    error::{Error, Result},
    provider::{AdapterRegistry, GenerationOptions, ProviderAdapter, ProviderId},
    template::PromptRenderer,
};
use tracing::{debug, info, warn};

/// Holds the active provider adapter and turns its results into `Result`s.
pub struct GenerationService {
    registry: AdapterRegistry,
    llm: LlmSettings,
    preamble: String,
    adapter: Option<Box<dyn ProviderAdapter>>,
    warning: Option<String>,
    renderer: PromptRenderer,
}

impl std::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationService")
            .field("provider", &self.llm.provider)
            .field("model", &self.llm.model)
            .field("adapter", &self.adapter.as_ref().map(|a| a.provider_type()))
            .field("warning", &self.warning)
            .finish_non_exhaustive()
    }
}

impl GenerationService {
    /// Creates a service and initializes the adapter for the configured provider.
    ///
    /// An unknown provider is not an error here: the service starts without an
    /// adapter and records a configuration warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in prompt templates fail to parse.
    pub fn new(settings: &Settings, registry: AdapterRegistry) -> Result<Self> {
        let mut service = Self {
            registry,
            llm: settings.llm.clone(),
            preamble: settings.processing.default_prompt_template.clone(),
            adapter: None,
            warning: None,
            renderer: PromptRenderer::new()?,
        };
        service.initialize_adapter();
        Ok(service)
    }

    /// Selects and configures the adapter for the current provider.
    pub fn initialize_adapter(&mut self) {
        let provider = &self.llm.provider;
        match self.registry.create(provider) {
            Some(mut adapter) => {
                adapter.configure(&self.llm);
                debug!("Initialized adapter for provider '{}'", provider);
                self.adapter = Some(adapter);
                self.warning = None;
            }
            None => {
                let message = format!(
                    "Provider '{provider}' is not supported yet. Choose one of: {}",
                    self.registry
                        .providers()
                        .iter()
                        .map(ProviderId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                warn!("{}", message);
                self.adapter = None;
                self.warning = Some(message);
            }
        }
    }

    /// Replaces the settings and rebuilds the adapter.
    pub fn update_settings(&mut self, settings: &Settings) {
        let previous = self.llm.provider.clone();
        self.llm = settings.llm.clone();
        self.preamble = settings.processing.default_prompt_template.clone();
        self.adapter = None;
        self.initialize_adapter();

        if previous != self.llm.provider {
            info!("Switched provider from '{}' to '{}'", previous, self.llm.provider);
        }
    }

    /// Warning produced by the last adapter initialization, if any.
    #[must_use]
    pub fn configuration_warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Returns true if an adapter is active.
    #[must_use]
    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    /// Fills `template_content` according to `user_instruction`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProviderNotConfigured`] when no adapter is active
    /// - [`Error::GenerationFailed`] when the backend fails or returns empty text
    /// - [`Error::Template`] when the prompt cannot be rendered
    pub async fn generate_filled_template(
        &self,
        template_content: &str,
        user_instruction: &str,
    ) -> Result<String> {
        let prompt = self
            .renderer
            .render_fill(&self.preamble, template_content, user_instruction)?;
        self.generate_text(&prompt).await
    }

    /// Sends a raw prompt with the configured options.
    ///
    /// # Errors
    ///
    /// Same as [`GenerationService::generate_filled_template`].
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| Error::provider_not_configured(self.llm.provider.as_str()))?;

        let options = GenerationOptions::from_settings(&self.llm);
        debug!(
            "Sending {} chars to '{}' (model {})",
            prompt.len(),
            adapter.provider_type(),
            options.model
        );

        let result = adapter.generate_response(prompt, &options).await;
        let usage = result.token_usage;
        let text = result.into_text().map_err(Error::generation)?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::generation("The provider returned an empty response"));
        }

        debug!(
            "Received {} chars ({} total tokens)",
            trimmed.len(),
            usage.total
        );
        Ok(trimmed.to_string())
    }

    /// Probes the active adapter. `false` without adapter.
    pub async fn test_connection(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.test_connection().await,
            None => false,
        }
    }

    /// Model catalog of the active adapter. Empty without adapter.
    #[must_use]
    pub fn available_models(&self) -> Vec<String> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter.available_models())
            .unwrap_or_default()
    }

    pub(crate) fn renderer(&self) -> &PromptRenderer {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GenerationResult, TokenUsage};
    use crate::template::{TEMPLATE_END, TEMPLATE_START};
    use crate::test_support::MockAdapter;

    fn settings_for(provider: ProviderId) -> Settings {
        Settings::builder().provider(provider).build().unwrap()
    }

    fn service_with(mock: &MockAdapter) -> GenerationService {
        let mut registry = AdapterRegistry::new();
        mock.register(&mut registry, "mock");
        GenerationService::new(&settings_for("mock".into()), registry).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_fatal() {
        let service = GenerationService::new(
            &settings_for(ProviderId::ANTHROPIC),
            AdapterRegistry::with_defaults(),
        )
        .unwrap();

        assert!(!service.has_adapter());
        assert!(service.configuration_warning().unwrap().contains("anthropic"));
        assert!(!service.test_connection().await);
        assert!(service.available_models().is_empty());

        let err = service.generate_filled_template("T", "I").await.unwrap_err();
        assert!(err.is_provider_not_configured());
    }

    #[tokio::test]
    async fn test_generate_trims_and_wraps_prompt() {
        let mock = MockAdapter::replying("  Hello World \n");
        let service = service_with(&mock);

        let text = service
            .generate_filled_template("Hello {{input}}", "greet a new user")
            .await
            .unwrap();

        assert_eq!(text, "Hello World");
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(TEMPLATE_START));
        assert!(prompts[0].contains("Hello {{input}}"));
        assert!(prompts[0].contains(TEMPLATE_END));
        assert!(prompts[0].contains("greet a new user"));
    }

    #[tokio::test]
    async fn test_forwards_options() {
        let mock = MockAdapter::replying("ok");
        let mut registry = AdapterRegistry::new();
        mock.register(&mut registry, "mock");
        let settings = Settings::builder()
            .provider("mock")
            .model("m-1")
            .temperature(0.1)
            .max_tokens(42)
            .build()
            .unwrap();
        let service = GenerationService::new(&settings, registry).unwrap();

        service.generate_text("p").await.unwrap();

        let options = mock.last_options().unwrap();
        assert_eq!(options.model, "m-1");
        assert_eq!(options.max_tokens, 42);
        assert!((options.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_result_becomes_error() {
        let mock = MockAdapter::with_result(GenerationResult::failure("HTTP 503"));
        let service = service_with(&mock);

        let err = service.generate_text("p").await.unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_empty_text_is_error() {
        let mock = MockAdapter::with_result(GenerationResult::success("   ", TokenUsage::default()));
        let service = service_with(&mock);

        let err = service.generate_text("p").await.unwrap_err();
        assert!(err.is_generation());
    }

    #[tokio::test]
    async fn test_update_settings_switches_provider() {
        let mock = MockAdapter::replying("ok");
        let mut registry = AdapterRegistry::new();
        mock.register(&mut registry, "mock");
        let mut service =
            GenerationService::new(&settings_for(ProviderId::ANTHROPIC), registry).unwrap();
        assert!(!service.has_adapter());

        service.update_settings(&settings_for("mock".into()));

        assert!(service.has_adapter());
        assert!(service.configuration_warning().is_none());
        assert_eq!(service.available_models(), vec!["mock-model".to_string()]);
        assert!(service.test_connection().await);
    }
}
