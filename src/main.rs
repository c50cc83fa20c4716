use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use llm_fill::{
    FsStorage, Notice, NoticeLevel, Notifier, Pipeline, Settings, SettingsBuilder, SubmitOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_FILE: &str = "llm-fill.json";

#[derive(Parser, Debug)]
#[command(
    name = "llm-fill",
    version,
    author,
    about = "Fill document templates with LLM-generated content",
    long_about = "Fill document templates with LLM-generated content.\n\n\
    Templates are discovered in the configured templates folder of a workspace. \
    The selected template is sent to the provider together with your instruction, \
    and the reply is saved as a new file named after the template and the current time.\n\n\
    USAGE EXAMPLES:\n  \
      # Create a settings file in the current workspace\n  \
      llm-fill init\n\n  \
      # List templates\n  \
      llm-fill templates\n\n  \
      # Fill a template\n  \
      llm-fill fill --template Templates/welcome.md --instruction \"greet a new user\"\n\n  \
      # Use a local Ollama server\n  \
      llm-fill --provider ollama --model llama3.2 fill -t Templates/meeting.md -i \"weekly sync\""
)]
struct Cli {
    /// Workspace root; template and output paths are relative to it
    #[arg(short, long, default_value = ".", value_name = "DIR", global = true)]
    workspace: PathBuf,

    /// Settings file (defaults to llm-fill.json in the workspace)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Provider id (openai, ollama, custom)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Completion endpoint URL
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// API key
    #[arg(long, env = "LLM_FILL_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered templates
    Templates,

    /// Fill a template and save the result
    Fill {
        /// Template path, relative to the workspace
        #[arg(short, long, value_name = "PATH")]
        template: String,

        /// What the filled document should contain
        #[arg(short, long, value_name = "TEXT")]
        instruction: String,

        /// Rewrite the instruction before generation
        #[arg(long, conflicts_with = "no_optimize")]
        optimize: bool,

        /// Send the instruction as written
        #[arg(long)]
        no_optimize: bool,
    },

    /// List the models of the active provider
    Models,

    /// Test the provider connection
    Check,

    /// Write a default settings file
    Init,
}

/// Prints notices to stderr.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let prefix = match notice.level {
            NoticeLevel::Success => "✓",
            NoticeLevel::Failure => "✗",
            NoticeLevel::Info => "ℹ",
        };
        eprintln!("{prefix} {}", notice.message);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.workspace.join(DEFAULT_CONFIG_FILE));

    let storage = Arc::new(FsStorage::new(&cli.workspace));

    match &cli.command {
        Command::Init => init(&config_path)?,
        Command::Templates => {
            let settings = resolve_settings(&cli, &config_path)?;
            let pipeline =
                Pipeline::new(settings, storage).context("Failed to create pipeline")?;
            let templates = pipeline
                .repository()
                .templates()
                .await
                .context("Failed to list templates")?;

            if templates.is_empty() {
                eprintln!(
                    "No templates found in '{}'",
                    pipeline.settings().paths.templates_path
                );
            }
            for template in templates {
                println!("{:<30} {}", template.display_name, template.path);
            }
        }
        Command::Fill {
            template,
            instruction,
            optimize,
            no_optimize,
        } => {
            let settings = resolve_settings(&cli, &config_path)?;
            let mut builder = SettingsBuilder::from_settings(settings);
            if *optimize {
                builder = builder.prompt_optimization(true);
            } else if *no_optimize {
                builder = builder.prompt_optimization(false);
            }
            let settings = builder.build().context("Failed to build settings")?;

            let pipeline = Pipeline::new(settings, storage)
                .context("Failed to create pipeline")?
                .with_notifier(ConsoleNotifier);

            let session = pipeline.session();
            session.select_template(Some(template));
            session.set_instruction(instruction);

            return finish_fill(session.submit().await);
        }
        Command::Models => {
            let settings = resolve_settings(&cli, &config_path)?;
            let pipeline =
                Pipeline::new(settings, storage).context("Failed to create pipeline")?;
            let service = pipeline.service();
            if let Some(warning) = service.configuration_warning() {
                bail!(warning.to_string());
            }
            for model in service.available_models() {
                println!("{model}");
            }
        }
        Command::Check => {
            let settings = resolve_settings(&cli, &config_path)?;
            let pipeline =
                Pipeline::new(settings, storage).context("Failed to create pipeline")?;
            let provider = pipeline.settings().llm.provider.clone();
            let service = pipeline.service();
            if !service.has_adapter() {
                bail!(
                    "{}",
                    service
                        .configuration_warning()
                        .unwrap_or("No adapter for the configured provider")
                );
            }
            if service.test_connection().await {
                println!("✓ Connected to '{provider}'");
            } else {
                bail!("Could not reach provider '{provider}'");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Turns a fill result into the process outcome.
///
/// Failures were already reported by the console notifier, so they only set
/// the exit code.
fn finish_fill(outcome: SubmitOutcome) -> anyhow::Result<ExitCode> {
    match outcome {
        SubmitOutcome::Saved { path } => {
            println!("{path}");
            Ok(ExitCode::SUCCESS)
        }
        SubmitOutcome::Failed { .. } => Ok(ExitCode::FAILURE),
        SubmitOutcome::Ignored => bail!("Nothing to do: template and instruction are required"),
        SubmitOutcome::Discarded => bail!("Request was discarded"),
    }
}

fn resolve_settings(cli: &Cli, config_path: &Path) -> anyhow::Result<Settings> {
    let base = if config_path.exists() {
        Settings::load(config_path)
            .with_context(|| format!("Failed to load settings from {}", config_path.display()))?
    } else if cli.config.is_some() {
        bail!("Settings file {} does not exist", config_path.display());
    } else {
        Settings::default()
    };

    let mut builder = SettingsBuilder::from_settings(base);
    if let Some(provider) = &cli.provider {
        builder = builder.provider(provider.as_str());
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if let Some(url) = &cli.api_url {
        builder = builder.api_url(url);
    }
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }

    builder.build().context("Failed to build settings")
}

fn init(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Settings::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("llm_fill=info"),
        1 => EnvFilter::new("llm_fill=debug"),
        _ => EnvFilter::new("llm_fill=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Ok(())
}
