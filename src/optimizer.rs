//! Best-effort rewriting of the user's instruction before generation.

use crate::service::GenerationService;
use tracing::debug;

/// Lead-ins models like to put in front of the actual answer.
const LEAD_IN_PREFIXES: &[&str] = &["here's", "here is", "this is", "i've created"];

/// Quote pairs recognized when extracting the rewritten instruction.
const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\u{201c}', '\u{201d}')];

/// Rewrites instructions through the generation service when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptOptimizer {
    enabled: bool,
}

impl PromptOptimizer {
    /// Creates an optimizer.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Returns true if optimization is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables optimization.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns a more specific version of `instruction`.
    ///
    /// Disabled: returns the instruction unchanged. Enabled: one generation
    /// call followed by [`clean_response`]. Any failure, or an empty cleaned
    /// reply, falls back to the original instruction.
    pub async fn optimize(
        &self,
        service: &GenerationService,
        instruction: &str,
        template_content: &str,
    ) -> String {
        if !self.enabled {
            return instruction.to_string();
        }

        let prompt = match service.renderer().render_optimize(instruction, template_content) {
            Ok(prompt) => prompt,
            Err(e) => {
                debug!("Skipping optimization, prompt rendering failed: {}", e);
                return instruction.to_string();
            }
        };

        match service.generate_text(&prompt).await {
            Ok(reply) => {
                let cleaned = clean_response(&reply);
                if cleaned.is_empty() {
                    debug!("Optimization produced an empty instruction, keeping the original");
                    instruction.to_string()
                } else {
                    debug!("Optimized instruction: {}", cleaned);
                    cleaned
                }
            }
            Err(e) => {
                debug!("Optimization failed, keeping the original instruction: {}", e);
                instruction.to_string()
            }
        }
    }

    /// Point where the template and the final instruction meet.
    ///
    /// The template travels separately in the delimited fill prompt, so this
    /// returns the instruction as is.
    #[must_use]
    pub fn combine(&self, _template_content: &str, instruction: &str) -> String {
        instruction.to_string()
    }
}

/// Extracts the instruction from a model reply.
///
/// 1. The first quoted substring, trimmed, if there is one.
/// 2. Otherwise the first line of the first non-empty paragraph, with a
///    known lead-in (`Here's ...:`, `This is ...:`) removed up to the colon.
#[must_use]
pub fn clean_response(reply: &str) -> String {
    if let Some(quoted) = first_quoted(reply) {
        return quoted.trim().to_string();
    }

    let first_line = reply
        .split("\n\n")
        .map(str::trim)
        .find(|paragraph| !paragraph.is_empty())
        .and_then(|paragraph| paragraph.lines().next())
        .unwrap_or("")
        .trim();

    strip_lead_in(first_line).trim().to_string()
}

fn first_quoted(text: &str) -> Option<&str> {
    QUOTE_PAIRS
        .iter()
        .filter_map(|&(open, close)| {
            let start = text.find(open)? + open.len_utf8();
            let len = text[start..].find(close)?;
            Some((start, &text[start..start + len]))
        })
        .filter(|(_, quoted)| !quoted.trim().is_empty())
        .min_by_key(|(start, _)| *start)
        .map(|(_, quoted)| quoted)
}

fn strip_lead_in(line: &str) -> &str {
    let lower = line.to_lowercase();
    let has_lead_in = LEAD_IN_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix));

    if has_lead_in {
        if let Some(colon) = line.find(':') {
            return &line[colon + 1..];
        }
    }
    line
}
