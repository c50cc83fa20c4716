use crate::error::{Error, Result};
use crate::frontmatter;

/// Maximum template size (1MB)
const MAX_TEMPLATE_SIZE: usize = 1024 * 1024;

/// Minimal format checks for template documents.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates loaded template content.
    ///
    /// Performs the following checks:
    /// 1. Content is not empty or whitespace-only
    /// 2. Content size is within limits
    /// 3. Content has no NUL bytes (binary files)
    /// 4. A leading frontmatter block, if any, is a closed YAML mapping
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContent`] describing the first failed check.
    pub(crate) fn validate_content(path: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::invalid_content(path, "Template is empty"));
        }

        if content.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::invalid_content(
                path,
                format!(
                    "Template too large: {} bytes (max: {} bytes)",
                    content.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        if memchr::memchr(0, content.as_bytes()).is_some() {
            return Err(Error::invalid_content(
                path,
                "Template contains binary data",
            ));
        }

        frontmatter::split(content)
            .map_err(|reason| Error::invalid_content(path, reason))?;

        Ok(())
    }
}
