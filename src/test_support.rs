//! Scripted provider adapter shared by unit tests.

use crate::config::LlmSettings;
use crate::provider::{
    AdapterRegistry, GenerationOptions, GenerationResult, ProviderAdapter, ProviderId, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorded {
    prompts: Vec<String>,
    options: Vec<GenerationOptions>,
    queued: VecDeque<GenerationResult>,
}

/// Adapter returning canned results and recording every request.
///
/// Clones share their recordings, so a test can keep one handle while the
/// registry hands out others.
#[derive(Clone)]
pub(crate) struct MockAdapter {
    id: ProviderId,
    result: GenerationResult,
    delay: Option<Duration>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockAdapter {
    pub(crate) fn with_result(result: GenerationResult) -> Self {
        Self {
            id: ProviderId::from("mock"),
            result,
            delay: None,
            recorded: Arc::default(),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        Self::with_result(GenerationResult::success(
            text,
            TokenUsage {
                input: 10,
                output: 5,
                total: 15,
            },
        ))
    }

    /// Suspends each call for `delay` before answering.
    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Results returned (in order) before falling back to the default one.
    pub(crate) fn then_reply(self, results: impl IntoIterator<Item = GenerationResult>) -> Self {
        self.recorded
            .lock()
            .unwrap()
            .queued
            .extend(results);
        self
    }

    pub(crate) fn register(&self, registry: &mut AdapterRegistry, id: &str) {
        let mut template = self.clone();
        template.id = ProviderId::from(id);
        registry.register(id, move || Box::new(template.clone()) as Box<dyn ProviderAdapter>);
    }

    pub(crate) fn calls(&self) -> usize {
        self.recorded.lock().unwrap().prompts.len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.recorded.lock().unwrap().prompts.clone()
    }

    pub(crate) fn last_options(&self) -> Option<GenerationOptions> {
        self.recorded.lock().unwrap().options.last().cloned()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn configure(&mut self, _settings: &LlmSettings) {}

    async fn generate_response(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult {
        let queued = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.prompts.push(prompt.to_string());
            recorded.options.push(options.clone());
            recorded.queued.pop_front()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        queued.unwrap_or_else(|| self.result.clone())
    }

    async fn test_connection(&self) -> bool {
        self.result.is_success()
    }

    fn provider_type(&self) -> ProviderId {
        self.id.clone()
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }
}
