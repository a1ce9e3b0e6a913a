use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use penwright_core::article::Article;
use penwright_core::error::{PenwrightError, Result};

/// Checks that a JSON object carries a set of keys.
pub struct OutputValidator {
    /// Keys that must be present in the object.
    pub required_keys: Vec<String>,
}

/// Result of output validation.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// Output is valid.
    Valid,
    /// Output has issues.
    Invalid { issues: Vec<String> },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

impl OutputValidator {
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            required_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self, value: &Value) -> ValidationResult {
        let Some(obj) = value.as_object() else {
            return ValidationResult::Invalid {
                issues: vec!["Expected JSON object but got non-object".to_string()],
            };
        };
        let issues: Vec<String> = self
            .required_keys
            .iter()
            .filter(|key| !obj.contains_key(key.as_str()))
            .map(|key| format!("Missing required key: '{}'", key))
            .collect();

        if issues.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { issues }
        }
    }
}

/// Heuristic repair of model output that should be JSON:
/// strips code fences and surrounding prose, then balances braces.
pub fn repair_json(output: &str) -> String {
    let stripped = strip_code_fences(output);
    let body = extract_json(&stripped);
    if body.starts_with('{') || body.starts_with('[') {
        balance_braces(body)
    } else {
        body.to_string()
    }
}

/// Repair and parse model output into a JSON value.
pub fn parse_value(output: &str) -> Result<Value> {
    let repaired = repair_json(output);
    serde_json::from_str(&repaired).map_err(|e| {
        debug!(error = %e, "Model output is not valid JSON");
        PenwrightError::LlmParse(format!("invalid JSON from model: {e}"))
    })
}

/// Repair and parse model output into `T`.
pub fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T> {
    let value = parse_value(output)?;
    serde_json::from_value(value)
        .map_err(|e| PenwrightError::LlmParse(format!("unexpected JSON shape: {e}")))
}

/// Repair, parse and validate a written article.
pub fn parse_article(output: &str) -> Result<Article> {
    let value = parse_value(output).map_err(|e| PenwrightError::InvalidArticle(e.to_string()))?;
    Article::from_value(value)
}

/// Strip markdown code fences from text.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip optional language tag on same line
        let content_start = after.find('\n').map_or(0, |p| p + 1);
        let after = &after[content_start..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Slice from the first opening brace to the last closing one.
/// Unterminated objects keep their tail for [`balance_braces`].
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find(['{', '[']) else {
        return trimmed;
    };
    let tail = &trimmed[start..];
    let closer = if tail.starts_with('{') { '}' } else { ']' };
    match tail.rfind(closer) {
        Some(end) if balance_braces(&tail[..=end]).len() == end + 1 => &tail[..=end],
        _ => tail,
    }
}

/// Balance JSON braces/brackets by appending missing closers.
fn balance_braces(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut result = text.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }
    result
}
