use crate::{
    config::Settings,
    error::{Error, Result},
    frontmatter,
    optimizer::PromptOptimizer,
    provider::AdapterRegistry,
    repository::{Template, TemplateRepository},
    service::GenerationService,
    storage::Storage,
    writer::OutputWriter,
};
use chrono::Utc;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Operation completed
    Success,
    /// Operation failed
    Failure,
    /// Informational
    Info,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Message text
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Receives user-facing notices.
pub trait Notifier {
    /// Shows a notice.
    fn notify(&self, notice: Notice);
}

/// Notifier that writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Failure => warn!("{}", notice.message),
        }
    }
}

/// Result of a successful fill.
#[derive(Debug, Clone, Serialize)]
pub struct FillOutcome {
    /// Template used
    pub template_path: String,

    /// Workspace-relative path of the created file
    pub output_path: String,

    /// Instruction sent with the template, after optional optimization
    pub instruction: String,

    /// Whether the instruction was rewritten by the optimizer
    pub optimized: bool,

    /// Length of the saved document in bytes
    pub bytes_written: usize,

    /// Total execution time
    pub duration: Duration,
}

/// Plugin-wide components shared by every session.
pub struct Pipeline {
    settings: Settings,
    repository: TemplateRepository,
    service: GenerationService,
    optimizer: PromptOptimizer,
    writer: OutputWriter,
    notifier: Box<dyn Notifier>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("repository", &self.repository)
            .field("service", &self.service)
            .field("optimizer", &self.optimizer)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with the built-in provider adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the prompt templates
    /// fail to load.
    pub fn new(settings: Settings, storage: Arc<dyn Storage>) -> Result<Self> {
        Self::with_registry(settings, storage, AdapterRegistry::with_defaults())
    }

    /// Creates a pipeline with a custom adapter registry.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::new`].
    pub fn with_registry(
        settings: Settings,
        storage: Arc<dyn Storage>,
        registry: AdapterRegistry,
    ) -> Result<Self> {
        settings.validate()?;

        let repository = TemplateRepository::new(&settings.paths, Arc::clone(&storage));
        let service = GenerationService::new(&settings, registry)?;
        let optimizer = PromptOptimizer::new(settings.processing.use_prompt_optimization);
        let writer = OutputWriter::new(&settings.paths, storage);

        Ok(Self {
            settings,
            repository,
            service,
            optimizer,
            writer,
            notifier: Box::new(TracingNotifier),
        })
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Template repository.
    #[must_use]
    pub fn repository(&self) -> &TemplateRepository {
        &self.repository
    }

    /// Generation service.
    #[must_use]
    pub fn service(&self) -> &GenerationService {
        &self.service
    }

    /// Applies new settings to every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid; nothing is changed then.
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;

        self.service.update_settings(&settings);
        self.repository.apply_settings(&settings.paths);
        self.writer.apply_settings(&settings.paths);
        self.optimizer
            .set_enabled(settings.processing.use_prompt_optimization);
        self.settings = settings;

        info!("Settings updated");
        Ok(())
    }

    /// Opens an interactive session.
    #[must_use]
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// Runs load, optimize, generate and write for one request.
    ///
    /// # Process
    ///
    /// 1. **Load**: reads and validates the template
    /// 2. **Optimize**: rewrites the instruction when enabled (never fails)
    /// 3. **Generate**: sends the delimited prompt to the provider
    /// 4. **Write**: adds frontmatter if configured and saves a new file
    ///
    /// # Errors
    ///
    /// Returns the first error from any stage except optimization.
    #[instrument(skip(self, instruction))]
    pub async fn fill(&self, template_path: &str, instruction: &str) -> Result<FillOutcome> {
        let (content, outcome) = self.generate(template_path, instruction).await?;
        self.save(outcome, &content).await
    }

    async fn generate(
        &self,
        template_path: &str,
        instruction: &str,
    ) -> Result<(String, PendingOutput)> {
        let started = Instant::now();

        info!("Stage 1/4: Loading template...");
        let template = self.repository.template(template_path).await?;
        let template_content = self.repository.load_template(&template.path).await?;

        if self.optimizer.is_enabled() {
            info!("Stage 2/4: Optimizing instruction...");
        } else {
            info!("Stage 2/4: Using instruction as written");
        }
        let final_instruction = self
            .optimizer
            .optimize(&self.service, instruction, &template_content)
            .await;
        let optimized = final_instruction != instruction;
        let combined = self.optimizer.combine(&template_content, &final_instruction);

        info!("Stage 3/4: Generating content...");
        let generated = self
            .service
            .generate_filled_template(&template_content, &combined)
            .await?;

        let content = frontmatter::decorate(
            &generated,
            &template.path,
            &template_content,
            &self.settings.processing,
            Utc::now(),
        )?;

        Ok((
            content,
            PendingOutput {
                template,
                instruction: combined,
                optimized,
                started,
            },
        ))
    }

    async fn save(&self, pending: PendingOutput, content: &str) -> Result<FillOutcome> {
        info!("Stage 4/4: Writing output file...");
        let output_path = self
            .writer
            .create_filled_file(&pending.template, content)
            .await?;

        let duration = pending.started.elapsed();
        info!(
            "✓ Filled '{}' into '{}' in {:.2}s",
            pending.template.display_name,
            output_path,
            duration.as_secs_f64()
        );

        Ok(FillOutcome {
            template_path: pending.template.path,
            output_path,
            instruction: pending.instruction,
            optimized: pending.optimized,
            bytes_written: content.len(),
            duration,
        })
    }
}

struct PendingOutput {
    template: Template,
    instruction: String,
    optimized: bool,
    started: Instant,
}

/// Processing state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingState {
    /// Waiting for input
    #[default]
    Idle,
    /// A request is in flight
    Running,
    /// The last request saved a file
    Succeeded,
    /// The last request failed
    Failed,
}

/// Events published to session observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The processing state changed
    StateChanged(ProcessingState),
    /// Submission became possible or impossible
    SubmitEnabled(bool),
}

/// What a call to [`Session::submit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing happened: a request is in flight or the input is incomplete
    Ignored,
    /// A file was saved
    Saved {
        /// Workspace-relative path of the new file
        path: String,
    },
    /// The request failed
    Failed {
        /// User-facing reason
        message: String,
    },
    /// The session was closed before the result arrived
    Discarded,
}

type Observer<'p> = Rc<dyn Fn(&SessionEvent) + 'p>;

/// One interactive request cycle: template selection, instruction, submit.
///
/// Sessions run on a single thread; state lives in `Cell`/`RefCell` and is
/// never borrowed across an await or while observers run, so observers may
/// call back into the session (including [`Session::close`]).
pub struct Session<'p> {
    pipeline: &'p Pipeline,
    state: Cell<ProcessingState>,
    selected: RefCell<Option<String>>,
    instruction: RefCell<String>,
    submit_enabled: Cell<bool>,
    closed: Cell<bool>,
    observers: RefCell<Vec<Observer<'p>>>,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.get())
            .field("selected", &self.selected.borrow())
            .field("closed", &self.closed.get())
            .finish_non_exhaustive()
    }
}

impl<'p> Session<'p> {
    fn new(pipeline: &'p Pipeline) -> Self {
        if let Some(warning) = pipeline.service.configuration_warning() {
            pipeline
                .notifier
                .notify(Notice::new(NoticeLevel::Info, warning));
        }

        Self {
            pipeline,
            state: Cell::new(ProcessingState::Idle),
            selected: RefCell::new(None),
            instruction: RefCell::new(String::new()),
            submit_enabled: Cell::new(false),
            closed: Cell::new(false),
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Registers an observer for state and enablement changes.
    pub fn subscribe(&self, observer: impl Fn(&SessionEvent) + 'p) {
        self.observers.borrow_mut().push(Rc::new(observer));
    }

    /// Current processing state.
    #[must_use]
    pub fn state(&self) -> ProcessingState {
        self.state.get()
    }

    /// Selects a template (or clears the selection).
    pub fn select_template(&self, path: Option<&str>) {
        *self.selected.borrow_mut() = path.map(ToString::to_string);
        self.update_submit_enabled();
    }

    /// Replaces the instruction text.
    pub fn set_instruction(&self, text: &str) {
        *self.instruction.borrow_mut() = text.to_string();
        self.update_submit_enabled();
    }

    /// Returns true if submit would start a request.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.state.get() == ProcessingState::Idle
            && !self.closed.get()
            && self.selected.borrow().is_some()
            && !self.instruction.borrow().trim().is_empty()
    }

    /// Starts a request if the session is idle and the input is complete.
    ///
    /// Errors are reported through the notifier and returned as
    /// [`SubmitOutcome::Failed`]; the session then goes back to idle.
    pub async fn submit(&self) -> SubmitOutcome {
        if !self.can_submit() {
            debug!("Submit ignored in state {:?}", self.state.get());
            return SubmitOutcome::Ignored;
        }

        let Some(template) = self.selected.borrow().clone() else {
            return SubmitOutcome::Ignored;
        };
        let instruction = self.instruction.borrow().trim().to_string();

        self.transition(ProcessingState::Running);

        let generated = self.pipeline.generate(&template, &instruction).await;
        if self.closed.get() {
            debug!("Session closed while generating; discarding result");
            return SubmitOutcome::Discarded;
        }

        let saved = match generated {
            Ok((content, pending)) => self.pipeline.save(pending, &content).await,
            Err(e) => Err(e),
        };
        if self.closed.get() {
            match &saved {
                Ok(outcome) => debug!(
                    "Session closed while saving; '{}' was written but the result is discarded",
                    outcome.output_path
                ),
                Err(e) => debug!("Session closed while saving; discarding error: {}", e),
            }
            return SubmitOutcome::Discarded;
        }

        let outcome = match saved {
            Ok(outcome) => {
                self.pipeline.notifier.notify(Notice::new(
                    NoticeLevel::Success,
                    format!("Created {}", outcome.output_path),
                ));
                self.transition(ProcessingState::Succeeded);
                SubmitOutcome::Saved {
                    path: outcome.output_path,
                }
            }
            Err(e) => {
                let message = failure_message(&e);
                self.pipeline
                    .notifier
                    .notify(Notice::new(NoticeLevel::Failure, message.clone()));
                self.transition(ProcessingState::Failed);
                SubmitOutcome::Failed { message }
            }
        };

        if !self.closed.get() {
            self.transition(ProcessingState::Idle);
        }
        outcome
    }

    /// Closes the session. An in-flight result will be discarded.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.transition(ProcessingState::Idle);
        self.observers.borrow_mut().clear();
    }

    fn transition(&self, to: ProcessingState) {
        if self.state.replace(to) != to {
            debug!("Session state -> {:?}", to);
            self.publish(&SessionEvent::StateChanged(to));
        }
        self.update_submit_enabled();
    }

    fn update_submit_enabled(&self) {
        let enabled = self.can_submit();
        if self.submit_enabled.replace(enabled) != enabled {
            self.publish(&SessionEvent::SubmitEnabled(enabled));
        }
    }

    fn publish(&self, event: &SessionEvent) {
        let observers = self.observers.borrow().clone();
        for observer in observers {
            observer(event);
        }
    }
}

/// Maps a pipeline error to the message shown to the user.
fn failure_message(error: &Error) -> String {
    match error {
        Error::NotFound { .. } | Error::InvalidContent { .. } => {
            format!("Failed to load template: {error}")
        }
        Error::FileSystem { .. } | Error::AlreadyExists { .. } => {
            format!("Failed to save file: {error}")
        }
        _ => format!("Generation failed: {error}"),
    }
}
