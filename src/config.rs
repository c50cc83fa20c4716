use crate::error::{Error, Result};
use crate::provider::ProviderId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo-instruct";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2_000;
const DEFAULT_TEMPLATES_PATH: &str = "Templates";
const DEFAULT_TEMPLATE_EXTENSION: &str = "md";
const DEFAULT_SCAN_INTERVAL_MS: u64 = 5_000;
const DEFAULT_PROMPT_TEMPLATE: &str = "You are a helpful assistant that fills document templates. \
Follow the structure of the template and replace its placeholders with content that \
satisfies the instruction. Return only the filled document.";

/// Settings for the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    /// Provider identifier used to select an adapter
    pub provider: ProviderId,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Endpoint override; adapters fall back to their default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model identifier
    pub model: String,

    /// Sampling temperature in `[0, 1]`
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderId::OPENAI,
            api_key: String::new(),
            api_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Workspace paths used by the repository and the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathSettings {
    /// Folder containing templates, relative to the workspace root
    pub templates_path: String,

    /// Folder receiving generated files; empty means the workspace root
    pub output_path: String,

    /// Extension (without dot) of template files
    pub template_extension: String,

    /// Minimum delay between two template folder scans
    pub scan_interval_ms: u64,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            templates_path: DEFAULT_TEMPLATES_PATH.to_string(),
            output_path: String::new(),
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
        }
    }
}

impl PathSettings {
    /// Returns the scan interval as a [`Duration`].
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Options controlling how a request is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingSettings {
    /// Rewrite the instruction with the model before generating
    pub use_prompt_optimization: bool,

    /// Preamble placed at the top of every fill prompt
    pub default_prompt_template: String,

    /// Prepend YAML frontmatter to generated files
    pub include_frontmatter: bool,

    /// Copy `tags` from the template's frontmatter
    pub inherit_template_tags: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            use_prompt_optimization: false,
            default_prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            include_frontmatter: false,
            inherit_template_tags: false,
        }
    }
}

/// Complete settings object threaded through the pipeline components.
///
/// Use [`Settings::builder()`] to construct settings in code, or
/// [`Settings::load()`] to read a JSON settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Settings {
    /// Generation backend
    pub llm: LlmSettings,

    /// Workspace paths
    pub paths: PathSettings,

    /// Processing options
    pub processing: ProcessingSettings,
}

impl Settings {
    /// Creates a new settings builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_fill::Settings;
    ///
    /// let settings = Settings::builder()
    ///     .templates_path("Templates")
    ///     .temperature(0.3)
    ///     .build()
    ///     .expect("valid settings");
    /// ```
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Reads settings from a JSON file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes settings as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Temperature is outside `[0, 1]`
    /// - `max_tokens` is zero
    /// - Model or template extension is empty
    /// - Template extension starts with a dot
    pub fn validate(&self) -> Result<()> {
        let llm = &self.llm;
        if !(0.0..=1.0).contains(&llm.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0 and 1, got {}",
                llm.temperature
            )));
        }

        if llm.max_tokens == 0 {
            return Err(Error::config("maxTokens must be greater than 0"));
        }

        if llm.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        let ext = &self.paths.template_extension;
        if ext.trim().is_empty() {
            return Err(Error::config("templateExtension must not be empty"));
        }

        if ext.starts_with('.') {
            return Err(Error::config(format!(
                "templateExtension must not start with a dot: '{ext}'"
            )));
        }

        if self.llm.provider == ProviderId::CUSTOM && self.llm.api_url.is_none() {
            warn!("Provider 'custom' has no apiUrl; generation requests will fail");
        }

        Ok(())
    }
}

/// Builder for creating [`Settings`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Starts from existing settings instead of the defaults.
    #[must_use]
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Sets the provider identifier.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.settings.llm.provider = provider.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.settings.llm.api_key = key.into();
        self
    }

    /// Sets the endpoint override.
    #[must_use]
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.settings.llm.api_url = Some(url.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.settings.llm.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.settings.llm.temperature = temperature;
        self
    }

    /// Sets the maximum number of generated tokens.
    #[must_use]
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.settings.llm.max_tokens = tokens;
        self
    }

    /// Sets the templates folder.
    #[must_use]
    pub fn templates_path(mut self, path: impl Into<String>) -> Self {
        self.settings.paths.templates_path = path.into();
        self
    }

    /// Sets the output folder. Empty means the workspace root.
    #[must_use]
    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.settings.paths.output_path = path.into();
        self
    }

    /// Sets the template file extension (without the leading dot).
    #[must_use]
    pub fn template_extension(mut self, ext: impl Into<String>) -> Self {
        self.settings.paths.template_extension = ext.into();
        self
    }

    /// Sets the minimum delay between template folder scans.
    #[must_use]
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.settings.paths.scan_interval_ms =
            u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables prompt optimization.
    #[must_use]
    pub fn prompt_optimization(mut self, enabled: bool) -> Self {
        self.settings.processing.use_prompt_optimization = enabled;
        self
    }

    /// Sets the preamble placed at the top of fill prompts.
    #[must_use]
    pub fn default_prompt_template(mut self, preamble: impl Into<String>) -> Self {
        self.settings.processing.default_prompt_template = preamble.into();
        self
    }

    /// Enables or disables frontmatter on generated files.
    #[must_use]
    pub fn include_frontmatter(mut self, enabled: bool) -> Self {
        self.settings.processing.include_frontmatter = enabled;
        self
    }

    /// Enables or disables tag inheritance from templates.
    #[must_use]
    pub fn inherit_template_tags(mut self, enabled: bool) -> Self {
        self.settings.processing.inherit_template_tags = enabled;
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
