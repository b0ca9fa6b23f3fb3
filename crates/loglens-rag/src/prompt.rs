// Prompt assembly - deterministic template rendering
//
// The template carries four placeholders: {log_context}, {query},
// {max_parts} and {max_part_length}. All four must be present at load time
// and nothing else in braces is allowed, so rendering itself cannot fail.

use regex::Regex;

use loglens_core::{RetrievedContext, ShapeLimits};
use loglens_providers::{ConfigError, PromptConfig};

const REQUIRED_PLACEHOLDERS: [&str; 4] =
    ["log_context", "query", "max_parts", "max_part_length"];

/// Built-in template, used when the config names no template file
pub const DEFAULT_TEMPLATE: &str = r#"You are a senior SRE assistant answering questions about system logs.
Use only the log evidence below; say so when the logs are not enough.

## Relevant logs
{log_context}

## Question
{query}

## Output rules
- At most {max_parts} findings, one per line.
- Keep each finding under {max_part_length} characters.
- Plain text lines only, no markdown headings, no preamble.
"#;

pub struct PromptAssembler {
    template: String,
    shape: ShapeLimits,
    placeholder: Regex,
}

impl PromptAssembler {
    /// Validate and hold a template. Missing required placeholders and
    /// unknown `{...}` placeholders are both startup-fatal.
    pub fn new(template: &str, shape: ShapeLimits) -> Result<Self, ConfigError> {
        let placeholder = Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex");

        for required in REQUIRED_PLACEHOLDERS {
            if !template.contains(&format!("{{{}}}", required)) {
                return Err(ConfigError::MissingPlaceholder(required));
            }
        }
        for capture in placeholder.captures_iter(template) {
            let name = &capture[1];
            if !REQUIRED_PLACEHOLDERS.contains(&name) {
                return Err(ConfigError::UnresolvedPlaceholder(name.to_string()));
            }
        }

        Ok(Self {
            template: template.to_string(),
            shape,
            placeholder,
        })
    }

    /// Load the template named in config, or fall back to the built-in one
    pub fn from_config(prompt: &PromptConfig, shape: ShapeLimits) -> Result<Self, ConfigError> {
        match &prompt.template_path {
            Some(path) => {
                let template =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Template {
                        path: path.clone(),
                        source,
                    })?;
                Self::new(&template, shape)
            }
            None => Self::new(DEFAULT_TEMPLATE, shape),
        }
    }

    /// Render the final prompt. Substitution is single-pass, so placeholder-
    /// looking text inside the query or the logs is left alone.
    pub fn render(&self, context: &RetrievedContext, query: &str) -> String {
        let log_context = if context.is_empty() {
            "(no relevant logs found)".to_string()
        } else {
            context
                .iter()
                .enumerate()
                .map(|(i, scored)| format!("log {}: {}", i + 1, scored.chunk.content))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let max_parts = self.shape.max_parts.to_string();
        let max_part_length = self.shape.max_part_length.to_string();

        self.placeholder
            .replace_all(&self.template, |caps: &regex::Captures| {
                match &caps[1] {
                    "log_context" => log_context.clone(),
                    "query" => query.to_string(),
                    "max_parts" => max_parts.clone(),
                    _ => max_part_length.clone(),
                }
            })
            .into_owned()
    }
}
