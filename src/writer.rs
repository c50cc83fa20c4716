use crate::{
    config::PathSettings,
    error::{Error, Result},
    repository::Template,
    storage::{join_path, normalize_path, Storage},
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Persists generated documents as new files.
pub struct OutputWriter {
    storage: Arc<dyn Storage>,
    output_path: String,
    extension: String,
}

impl std::fmt::Debug for OutputWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputWriter")
            .field("output_path", &self.output_path)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl OutputWriter {
    /// Creates a writer from path settings.
    pub fn new(paths: &PathSettings, storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            output_path: normalize_path(&paths.output_path),
            extension: paths.template_extension.clone(),
        }
    }

    /// Applies new path settings.
    pub fn apply_settings(&mut self, paths: &PathSettings) {
        self.output_path = normalize_path(&paths.output_path);
        self.extension = paths.template_extension.clone();
    }

    /// Writes `content` to a new file named after `template` and the current time.
    ///
    /// Returns the workspace-relative path of the created file.
    ///
    /// # Errors
    ///
    /// - [`Error::FileSystem`] if the folder cannot be created or the write fails
    /// - [`Error::AlreadyExists`] if the computed path is taken
    pub async fn create_filled_file(&self, template: &Template, content: &str) -> Result<String> {
        self.create_filled_file_at(template, content, Utc::now()).await
    }

    /// Same as [`OutputWriter::create_filled_file`] with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`OutputWriter::create_filled_file`].
    pub async fn create_filled_file_at(
        &self,
        template: &Template,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<String> {
        self.ensure_folder().await?;

        let path = join_path(&self.output_path, &self.file_name(template, at));
        if self.storage.file_exists(&path).await? {
            return Err(Error::already_exists(path));
        }

        self.storage.create_file(&path, content).await?;

        info!("Created {} ({} bytes)", path, content.len());
        Ok(path)
    }

    /// Builds `{display name}-{timestamp}.{extension}`.
    ///
    /// The ISO 8601 timestamp has millisecond precision, with `:` and `.`
    /// replaced by `-`. Two files for the same template within the same
    /// millisecond map to the same name.
    #[must_use]
    pub fn file_name(&self, template: &Template, at: DateTime<Utc>) -> String {
        let timestamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}-{}.{}", template.display_name, timestamp, self.extension)
    }

    async fn ensure_folder(&self) -> Result<()> {
        if self.output_path.is_empty() || self.storage.folder_exists(&self.output_path).await? {
            return Ok(());
        }
        debug!("Creating output folder '{}'", self.output_path);
        self.storage.create_folder(&self.output_path).await
    }
}
