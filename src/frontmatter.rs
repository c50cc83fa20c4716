//! YAML frontmatter handling for templates and generated documents.

use crate::config::ProcessingSettings;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// Splits a leading frontmatter block from `content`.
///
/// Returns `(None, content)` when there is no frontmatter.
///
/// # Errors
///
/// Returns a reason when the block is not terminated or is not a YAML mapping.
pub(crate) fn split(content: &str) -> std::result::Result<(Option<Mapping>, &str), String> {
    let text = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = text
        .strip_prefix(DELIMITER)
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))
    else {
        return Ok((None, content));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == DELIMITER || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let mapping = parse_mapping(yaml)?;
            return Ok((Some(mapping), body));
        }
        offset += line.len();
    }

    Err("Frontmatter block is not terminated".to_string())
}

fn parse_mapping(yaml: &str) -> std::result::Result<Mapping, String> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err("Frontmatter must be a YAML mapping".to_string()),
        Err(e) => Err(format!("Invalid frontmatter: {e}")),
    }
}

/// Reads `tags` from a frontmatter mapping (list or delimited string).
#[must_use]
pub(crate) fn tags(mapping: &Mapping) -> Vec<String> {
    let raw: Vec<String> = match mapping.get("tags") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim().trim_start_matches('#').to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Adds frontmatter to a generated document according to the settings.
///
/// Keys the model already produced are kept; `template`, `created` and
/// inherited `tags` are added where missing (tags are merged).
///
/// # Errors
///
/// Returns an error if the frontmatter cannot be serialized.
pub(crate) fn decorate(
    generated: &str,
    template_path: &str,
    template_content: &str,
    processing: &ProcessingSettings,
    created_at: DateTime<Utc>,
) -> Result<String> {
    if !processing.include_frontmatter {
        return Ok(generated.to_string());
    }

    let (existing, body) = match split(generated) {
        Ok((Some(mapping), body)) => (mapping, body),
        _ => (Mapping::new(), generated),
    };
    let mut mapping = existing;

    insert_missing(&mut mapping, "template", Value::String(template_path.to_string()));
    insert_missing(
        &mut mapping,
        "created",
        Value::String(created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    if processing.inherit_template_tags {
        let inherited = match split(template_content) {
            Ok((Some(template_meta), _)) => tags(&template_meta),
            _ => Vec::new(),
        };
        if !inherited.is_empty() {
            let mut merged = tags(&mapping);
            for tag in inherited {
                if !merged.contains(&tag) {
                    merged.push(tag);
                }
            }
            mapping.insert(
                Value::String("tags".to_string()),
                Value::Sequence(merged.into_iter().map(Value::String).collect()),
            );
        }
    }

    let yaml = serde_yaml::to_string(&mapping)?;
    Ok(format!(
        "{DELIMITER}\n{yaml}{DELIMITER}\n\n{}",
        body.trim_start_matches(['\r', '\n'])
    ))
}

fn insert_missing(mapping: &mut Mapping, key: &str, value: Value) {
    let key = Value::String(key.to_string());
    if !mapping.contains_key(&key) {
        mapping.insert(key, value);
    }
}
