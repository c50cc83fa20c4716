use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the llm-fill library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Template is not present in the repository after a refresh.
    #[error("Template not found: '{path}'")]
    NotFound {
        /// Workspace-relative template path
        path: String,
    },

    /// Template content is empty or corrupt.
    #[error("Invalid template content in '{path}': {reason}")]
    InvalidContent {
        /// Workspace-relative template path
        path: String,
        /// Why the content was rejected
        reason: String,
    },

    /// No adapter is available for the configured provider.
    #[error("Provider adapter not initialized for '{provider}'. Check the provider settings.")]
    ProviderNotConfigured {
        /// Configured provider identifier
        provider: String,
    },

    /// Remote generation failed or returned nothing usable.
    #[error("Generation failed: {message}")]
    GenerationFailed {
        /// Error message reported by the adapter
        message: String,
    },

    /// Filesystem error with context about the path.
    #[error("Filesystem error accessing '{path}': {message}")]
    FileSystem {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Output file already exists.
    #[error("File already exists: '{path}'")]
    AlreadyExists {
        /// Path of the existing file
        path: String,
    },

    /// Prompt template rendering error.
    #[error("Failed to render prompt template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Serialization error (settings, frontmatter).
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a filesystem error with path context.
    ///
    /// `AlreadyExists` IO errors are mapped to [`Error::AlreadyExists`].
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            return Self::AlreadyExists {
                path: path.to_string_lossy().into_owned(),
            };
        }
        Self::FileSystem {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates an invalid content error.
    #[must_use]
    pub fn invalid_content(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a provider not configured error.
    #[must_use]
    pub fn provider_not_configured(provider: impl Into<String>) -> Self {
        Self::ProviderNotConfigured {
            provider: provider.into(),
        }
    }

    /// Creates a generation error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
        }
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is an invalid content error.
    #[must_use]
    pub const fn is_invalid_content(&self) -> bool {
        matches!(self, Self::InvalidContent { .. })
    }

    /// Returns true if no provider adapter was available.
    #[must_use]
    pub const fn is_provider_not_configured(&self) -> bool {
        matches!(self, Self::ProviderNotConfigured { .. })
    }

    /// Returns true if this is a generation error.
    #[must_use]
    pub const fn is_generation(&self) -> bool {
        matches!(self, Self::GenerationFailed { .. })
    }

    /// Returns true if this is a filesystem error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::FileSystem { .. })
    }

    /// Returns true if this is an already exists error.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/test.txt", io_err);
        assert!(err.is_io());
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn test_io_already_exists_maps_to_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists");
        let err = Error::io("out/Welcome.md", io_err);
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("out/Welcome.md"));
    }

    #[test]
    fn test_taxonomy_predicates() {
        assert!(Error::not_found("a.md").is_not_found());
        assert!(Error::invalid_content("a.md", "empty").is_invalid_content());
        assert!(Error::provider_not_configured("anthropic").is_provider_not_configured());
        assert!(Error::generation("boom").is_generation());
        assert!(Error::already_exists("a.md").is_already_exists());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::generation("test");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
