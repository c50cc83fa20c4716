use crate::error::{Error, Result};
use serde::Serialize;
use tera::{Context, Tera};

const FILL_TEMPLATE: &str = "fill";
const OPTIMIZE_TEMPLATE: &str = "optimize";

/// Marker opening the literal template body in a fill prompt.
pub const TEMPLATE_START: &str = "<<<TEMPLATE START>>>";
/// Marker closing the literal template body in a fill prompt.
pub const TEMPLATE_END: &str = "<<<TEMPLATE END>>>";
/// Marker opening the instruction block in a fill prompt.
pub const INSTRUCTION_START: &str = "<<<INSTRUCTION START>>>";
/// Marker closing the instruction block in a fill prompt.
pub const INSTRUCTION_END: &str = "<<<INSTRUCTION END>>>";

#[derive(Serialize)]
struct FillContext<'a> {
    preamble: &'a str,
    template: &'a str,
    instruction: &'a str,
}

#[derive(Serialize)]
struct OptimizeContext<'a> {
    instruction: &'a str,
    template: &'a str,
}

/// Renders the prompts sent to the generation backend.
pub(crate) struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    /// Creates a renderer with the built-in prompt templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in template fails to parse.
    pub(crate) fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);

        tera.add_raw_template(FILL_TEMPLATE, include_str!("../templates/fill.tera"))
            .map_err(|e| Error::template(FILL_TEMPLATE, e))?;

        tera.add_raw_template(OPTIMIZE_TEMPLATE, include_str!("../templates/optimize.tera"))
            .map_err(|e| Error::template(OPTIMIZE_TEMPLATE, e))?;

        Ok(Self { tera })
    }

    /// Renders the structured fill prompt.
    ///
    /// The template body and the instruction end up in separate delimited
    /// blocks; the template text is inserted verbatim, never interpreted.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub(crate) fn render_fill(
        &self,
        preamble: &str,
        template: &str,
        instruction: &str,
    ) -> Result<String> {
        let ctx = FillContext {
            preamble: preamble.trim(),
            template: template.trim_end(),
            instruction: instruction.trim(),
        };
        self.render(FILL_TEMPLATE, &ctx)
    }

    /// Renders the instruction-rewriting prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub(crate) fn render_optimize(&self, instruction: &str, template: &str) -> Result<String> {
        let ctx = OptimizeContext {
            instruction: instruction.trim(),
            template: template.trim_end(),
        };
        self.render(OPTIMIZE_TEMPLATE, &ctx)
    }

    fn render<T: Serialize>(&self, name: &str, ctx: &T) -> Result<String> {
        let mut context = Context::new();
        context.insert("ctx", ctx);

        self.tera
            .render(name, &context)
            .map_err(|e| Error::template(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_creation() {
        assert!(PromptRenderer::new().is_ok());
    }

    #[test]
    fn test_fill_prompt_delimits_template() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer
            .render_fill("Be helpful.", "Hello {{input}}", "greet a new user")
            .unwrap();

        assert!(prompt.starts_with("Be helpful."));

        let start = prompt.find(TEMPLATE_START).unwrap();
        let end = prompt.find(TEMPLATE_END).unwrap();
        assert!(prompt[start..end].contains("Hello {{input}}"));

        let start = prompt.find(INSTRUCTION_START).unwrap();
        let end = prompt.find(INSTRUCTION_END).unwrap();
        assert!(prompt[start..end].contains("greet a new user"));
        assert!(end > prompt.find(TEMPLATE_END).unwrap());
    }

    #[test]
    fn test_fill_prompt_does_not_escape() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer
            .render_fill("", "<b>Tom & Jerry</b>", "keep \"quotes\"")
            .unwrap();

        assert!(prompt.contains("<b>Tom & Jerry</b>"));
        assert!(prompt.contains("keep \"quotes\""));
    }

    #[test]
    fn test_optimize_prompt() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer
            .render_optimize("write notes", "# Meeting\n- attendees")
            .unwrap();

        assert!(prompt.contains("Instruction: \"write notes\""));
        assert!(prompt.contains("# Meeting"));
    }
}
