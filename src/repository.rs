use crate::{
    config::PathSettings,
    error::{Error, Result},
    storage::{normalize_path, EntryKind, Storage},
    template_validator::TemplateValidator,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace, warn};

/// A template document discovered in the templates folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Workspace-relative path, unique within the repository
    pub path: String,

    /// Human-readable name derived from the file name
    pub display_name: String,

    /// Storage handle used to read the content
    pub content_ref: String,

    /// Modification time seen during the last scan
    pub last_modified: SystemTime,
}

impl Template {
    fn new(path: String, last_modified: SystemTime) -> Self {
        Self {
            display_name: display_name_for(&path),
            content_ref: path.clone(),
            path,
            last_modified,
        }
    }
}

/// Derives a display name from a template path.
///
/// The file stem is split into words on `-`, `_`, `.`, whitespace and
/// lower-to-upper case changes; each word is capitalized.
///
/// ```
/// use llm_fill::display_name_for;
///
/// assert_eq!(display_name_for("Templates/meeting-notes.md"), "Meeting Notes");
/// assert_eq!(display_name_for("weeklyReview.md"), "Weekly Review");
/// ```
#[must_use]
pub fn display_name_for(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in stem.chars() {
        if c == '-' || c == '_' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Discovers and caches templates from the configured folder.
///
/// The cache is refreshed lazily: a scan happens on access only when the
/// previous one is older than the scan interval.
pub struct TemplateRepository {
    storage: Arc<dyn Storage>,
    templates_path: String,
    extension: String,
    scan_interval: Duration,
    cache: RefCell<BTreeMap<String, Template>>,
    last_scan: Cell<Option<Instant>>,
}

impl std::fmt::Debug for TemplateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRepository")
            .field("templates_path", &self.templates_path)
            .field("extension", &self.extension)
            .field("scan_interval", &self.scan_interval)
            .field("cached", &self.cache.borrow().len())
            .finish_non_exhaustive()
    }
}

impl TemplateRepository {
    /// Creates a repository reading through `storage`.
    pub fn new(paths: &PathSettings, storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            templates_path: normalize_path(&paths.templates_path),
            extension: paths.template_extension.to_lowercase(),
            scan_interval: paths.scan_interval(),
            cache: RefCell::new(BTreeMap::new()),
            last_scan: Cell::new(None),
        }
    }

    /// Returns all templates, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if listing a folder fails during a rescan.
    pub async fn templates(&self) -> Result<Vec<Template>> {
        self.refresh_if_stale().await?;
        Ok(self.cache.borrow().values().cloned().collect())
    }

    /// Returns the template at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the template is absent after a refresh.
    pub async fn template(&self, path: &str) -> Result<Template> {
        self.refresh_if_stale().await?;
        let key = normalize_path(path);
        self.cache
            .borrow()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }

    /// Reads and validates the content of the template at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the template is unknown
    /// - [`Error::InvalidContent`] if the content is empty or corrupt
    /// - [`Error::FileSystem`] if the read fails
    pub async fn load_template(&self, path: &str) -> Result<String> {
        let template = self.template(path).await?;
        let content = self.storage.read_file(&template.content_ref).await?;
        TemplateValidator::validate_content(&template.path, &content)?;
        Ok(content)
    }

    /// Changes the templates folder and forces a rescan on next access.
    pub fn set_templates_path(&mut self, path: &str) {
        self.templates_path = normalize_path(path);
        self.last_scan.set(None);
    }

    /// Changes the template extension and forces a rescan on next access.
    pub fn set_template_extension(&mut self, extension: &str) {
        self.extension = extension.to_lowercase();
        self.last_scan.set(None);
    }

    /// Changes the minimum delay between scans.
    pub fn set_scan_interval(&mut self, interval: Duration) {
        self.scan_interval = interval;
    }

    /// Applies path settings, forcing a rescan when the folder or extension changed.
    pub fn apply_settings(&mut self, paths: &PathSettings) {
        if normalize_path(&paths.templates_path) != self.templates_path {
            self.set_templates_path(&paths.templates_path);
        }
        if paths.template_extension.to_lowercase() != self.extension {
            self.set_template_extension(&paths.template_extension);
        }
        self.set_scan_interval(paths.scan_interval());
    }

    /// Empties the cache and forces a rescan on next access.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
        self.last_scan.set(None);
    }

    /// Rescans the folder if the last scan is older than the scan interval.
    ///
    /// # Errors
    ///
    /// Returns an error if listing a folder fails.
    pub async fn refresh_if_stale(&self) -> Result<()> {
        let stale = self
            .last_scan
            .get()
            .is_none_or(|at| at.elapsed() > self.scan_interval);

        if stale {
            self.scan().await?;
        } else {
            trace!("Template cache is fresh, skipping scan");
        }
        Ok(())
    }

    /// Walks the templates folder and reconciles the cache with what was found.
    async fn scan(&self) -> Result<()> {
        let root = self.templates_path.clone();

        if !self.storage.folder_exists(&root).await? {
            warn!(
                "Templates folder '{}' does not exist or is not a folder; keeping {} cached templates",
                root,
                self.cache.borrow().len()
            );
            self.last_scan.set(Some(Instant::now()));
            return Ok(());
        }

        debug!("Scanning templates in '{}'", root);
        let found = self.walk(&root).await?;

        let mut seen = HashSet::with_capacity(found.len());
        let (mut added, mut updated) = (0usize, 0usize);
        {
            let mut cache = self.cache.borrow_mut();
            for (path, modified) in found {
                match cache.get_mut(&path) {
                    Some(existing) if existing.last_modified != modified => {
                        trace!("Template changed: {}", path);
                        existing.last_modified = modified;
                        updated += 1;
                    }
                    Some(_) => {}
                    None => {
                        cache.insert(path.clone(), Template::new(path.clone(), modified));
                        added += 1;
                    }
                }
                seen.insert(path);
            }

            let before = cache.len();
            cache.retain(|path, _| seen.contains(path));
            debug!(
                "Scan complete: {} templates ({} added, {} updated, {} removed)",
                cache.len(),
                added,
                updated,
                before - cache.len()
            );
        }

        self.last_scan.set(Some(Instant::now()));
        Ok(())
    }

    async fn walk(&self, root: &str) -> Result<Vec<(String, SystemTime)>> {
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{root}/")
        };

        let mut found = Vec::new();
        let mut pending = vec![root.to_string()];
        while let Some(folder) = pending.pop() {
            for entry in self.storage.list_folder(&folder).await? {
                match entry.kind {
                    EntryKind::Folder => pending.push(entry.path),
                    EntryKind::File { modified } => {
                        let path = normalize_path(&entry.path);
                        if path.starts_with(&prefix) && self.has_template_extension(&path) {
                            found.push((path, modified));
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    fn has_template_extension(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        name.rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext.to_lowercase() == self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorage;
    use assert_fs::prelude::*;

    fn repository(root: &std::path::Path, interval: Duration) -> TemplateRepository {
        let paths = PathSettings {
            templates_path: "Templates".to_string(),
            scan_interval_ms: u64::try_from(interval.as_millis()).unwrap(),
            ..PathSettings::default()
        };
        TemplateRepository::new(&paths, Arc::new(FsStorage::new(root)))
    }

    fn paths_of(templates: &[Template]) -> Vec<&str> {
        templates.iter().map(|t| t.path.as_str()).collect()
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name_for("welcome.md"), "Welcome");
        assert_eq!(display_name_for("Templates/meeting-notes.md"), "Meeting Notes");
        assert_eq!(display_name_for("daily_log v2.md"), "Daily Log V2");
        assert_eq!(display_name_for("weeklyReview.md"), "Weekly Review");
        assert_eq!(display_name_for("README"), "README");
    }

    #[test]
    fn test_template_from_dotted_folder() {
        let template = Template::new("Templates/a.b/c.md".to_string(), SystemTime::UNIX_EPOCH);
        assert_eq!(template.content_ref, "Templates/a.b/c.md");
        assert_eq!(template.display_name, "C");
    }

    #[tokio::test]
    async fn test_scan_finds_nested_templates() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/welcome.md").write_str("Hello").unwrap();
        temp.child("Templates/work/meeting-notes.MD").write_str("# Meeting").unwrap();
        temp.child("Templates/image.png").write_str("x").unwrap();
        temp.child("Notes/other.md").write_str("not a template").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));
        let templates = repo.templates().await.unwrap();

        assert_eq!(
            paths_of(&templates),
            vec!["Templates/welcome.md", "Templates/work/meeting-notes.MD"]
        );
        assert_eq!(templates[1].display_name, "Meeting Notes");
    }

    #[tokio::test]
    async fn test_fresh_cache_ignores_changes() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));
        let first = repo.templates().await.unwrap();

        temp.child("Templates/b.md").write_str("B").unwrap();
        let second = repo.templates().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stale_cache_reflects_changes() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();

        let repo = repository(temp.path(), Duration::from_millis(1));
        assert_eq!(repo.templates().await.unwrap().len(), 1);

        temp.child("Templates/b.md").write_str("B").unwrap();
        std::fs::remove_file(temp.child("Templates/a.md").path()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let templates = repo.templates().await.unwrap();
        assert_eq!(paths_of(&templates), vec!["Templates/b.md"]);
    }

    #[tokio::test]
    async fn test_repeated_scans_keep_unique_keys() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();
        temp.child("Templates/sub/a.md").write_str("A2").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));
        for _ in 0..3 {
            repo.clear_cache();
            let templates = repo.templates().await.unwrap();
            let unique: HashSet<_> = templates.iter().map(|t| &t.path).collect();
            assert_eq!(templates.len(), 2);
            assert_eq!(unique.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_missing_folder_keeps_cache() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();

        let mut repo = repository(temp.path(), Duration::from_secs(60));
        let before = repo.templates().await.unwrap();

        repo.set_templates_path("Missing");
        let after = repo.templates().await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_folder_path_is_a_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates").write_str("I am a file").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));
        assert!(repo.templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_templates_path_forces_rescan() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();
        temp.child("Other/b.md").write_str("B").unwrap();

        let mut repo = repository(temp.path(), Duration::from_secs(60));
        repo.templates().await.unwrap();

        repo.set_templates_path("Other/");
        let templates = repo.templates().await.unwrap();
        assert_eq!(paths_of(&templates), vec!["Other/b.md"]);
    }

    #[tokio::test]
    async fn test_template_not_found() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));
        let err = repo.template("Templates/missing.md").await.unwrap_err();
        assert!(err.is_not_found());

        let err = repo.load_template("Templates/missing.md").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_load_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/welcome.md").write_str("Hello {{input}}").unwrap();
        temp.child("Templates/empty.md").write_str("   \n").unwrap();

        let repo = repository(temp.path(), Duration::from_secs(60));

        let content = repo.load_template("/Templates/welcome.md").await.unwrap();
        assert_eq!(content, "Hello {{input}}");

        let err = repo.load_template("Templates/empty.md").await.unwrap_err();
        assert!(err.is_invalid_content());
    }

    #[tokio::test]
    async fn test_templates_at_workspace_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.md").write_str("A").unwrap();
        temp.child("nested/b.md").write_str("B").unwrap();

        let mut repo = repository(temp.path(), Duration::from_secs(60));
        repo.set_templates_path("");

        let templates = repo.templates().await.unwrap();
        assert_eq!(paths_of(&templates), vec!["a.md", "nested/b.md"]);
    }

    #[tokio::test]
    async fn test_changed_mtime_updates_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();
        temp.child("Templates/b.md").write_str("B").unwrap();

        let repo = repository(temp.path(), Duration::from_millis(1));
        let before = repo.template("Templates/a.md").await.unwrap();

        let newer = before.last_modified + Duration::from_secs(120);
        std::fs::OpenOptions::new()
            .write(true)
            .open(temp.child("Templates/a.md").path())
            .unwrap()
            .set_modified(newer)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let templates = repo.templates().await.unwrap();
        assert_eq!(paths_of(&templates), vec!["Templates/a.md", "Templates/b.md"]);
        assert_eq!(templates[0].last_modified, newer);
        assert_eq!(templates[0].display_name, before.display_name);
    }

    #[tokio::test]
    async fn test_apply_settings_with_new_extension_rescans() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Templates/a.md").write_str("A").unwrap();
        temp.child("Templates/b.txt").write_str("B").unwrap();

        let mut repo = repository(temp.path(), Duration::from_secs(60));
        assert_eq!(paths_of(&repo.templates().await.unwrap()), vec!["Templates/a.md"]);

        let paths = PathSettings {
            templates_path: "Templates".to_string(),
            template_extension: "txt".to_string(),
            scan_interval_ms: 60_000,
            ..PathSettings::default()
        };
        repo.apply_settings(&paths);

        assert_eq!(paths_of(&repo.templates().await.unwrap()), vec!["Templates/b.txt"]);
    }
}
