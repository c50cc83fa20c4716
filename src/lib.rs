//! # llm-fill
//!
//! Fills document templates with content generated by a language model.
//!
//! ## Features
//!
//! - Template discovery with a lazily refreshed cache
//! - Pluggable provider adapters behind a registry
//! - Optional instruction optimization before generation
//! - Frontmatter with inherited template tags
//! - Create-only output files named after the template and a timestamp
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use llm_fill::{FsStorage, Pipeline, Settings};
//!
//! # async fn fill() -> anyhow::Result<()> {
//! let settings = Settings::builder()
//!     .templates_path("Templates")
//!     .output_path("Generated")
//!     .api_key("sk-...")
//!     .build()?;
//!
//! let pipeline = Pipeline::new(settings, Arc::new(FsStorage::new("./notes")))?;
//! let outcome = pipeline.fill("Templates/welcome.md", "greet a new user").await?;
//! println!("{}", outcome.output_path);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A request runs through four stages:
//! 1. **Repository**: finds and loads the template
//! 2. **Optimizer**: rewrites the instruction (optional, never fails)
//! 3. **Service**: renders the prompt and calls the provider adapter
//! 4. **Writer**: saves the result as a new file
//!
//! [`Session`] wraps one interactive request cycle and guarantees at most one
//! generation in flight.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod frontmatter;
mod optimizer;
mod pipeline;
mod repository;
mod service;
mod storage;
mod template;
mod template_validator;
mod writer;

pub mod provider;

#[cfg(test)]
mod test_support;

pub use config::{LlmSettings, PathSettings, ProcessingSettings, Settings, SettingsBuilder};
pub use error::{Error, Result};
pub use optimizer::{clean_response, PromptOptimizer};
pub use pipeline::{
    FillOutcome, Notice, NoticeLevel, Notifier, Pipeline, ProcessingState, Session,
    SessionEvent, SubmitOutcome, TracingNotifier,
};
pub use provider::{AdapterRegistry, ProviderAdapter, ProviderId};
pub use repository::{display_name_for, Template, TemplateRepository};
pub use service::GenerationService;
pub use storage::{join_path, normalize_path, EntryKind, FsStorage, Storage, StorageEntry};
pub use template::{INSTRUCTION_END, INSTRUCTION_START, TEMPLATE_END, TEMPLATE_START};
pub use writer::OutputWriter;
