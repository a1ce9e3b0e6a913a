use serde::{Deserialize, Serialize};

/// Edge target that stops the run.
pub const END: &str = "__end__";

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id, or [`END`].
    pub to: String,
    /// Condition that must be true to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse only if the source node succeeded.
    OnSuccess,
    /// Traverse only if the source node failed.
    OnFailure,
    /// Traverse if a simple expression matches the state's signals.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`.
    Conditional { expr: String },
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge that fires on success.
    pub fn on_success(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::OnSuccess,
        }
    }

    /// Create an edge that fires on failure.
    pub fn on_failure(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::OnFailure,
        }
    }

    /// Create a conditional edge.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Conditional { expr: expr.into() },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.to == END
    }

    /// Whether this edge may be taken after the source node ran.
    pub fn matches(
        &self,
        succeeded: bool,
        signals: &std::collections::HashMap<String, serde_json::Value>,
    ) -> bool {
        match &self.condition {
            EdgeCondition::Always => true,
            EdgeCondition::OnSuccess => succeeded,
            EdgeCondition::OnFailure => !succeeded,
            EdgeCondition::Conditional { expr } => evaluate_condition(expr, signals),
        }
    }
}

/// Evaluate a simple conditional expression against the signal map.
///
/// Supported expressions:
/// - `key == "value"` exact match
/// - `key != "value"` not equal
/// - `key contains "substr"` substring match
///
/// Returns `false` for unparseable expressions and missing keys.
pub fn evaluate_condition(
    expr: &str,
    context: &std::collections::HashMap<String, serde_json::Value>,
) -> bool {
    let expr = expr.trim();

    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return context
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.contains(substr));
    }

    if let Some((key, value)) = parse_operator(expr, "!=") {
        return context
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s != value);
    }

    if let Some((key, value)) = parse_operator(expr, "==") {
        return context
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == value);
    }

    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, val.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn signals(pairs: &[(&str, &str)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn test_edge_builders() {
        let e = Edge::always("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(matches!(e.condition, EdgeCondition::Always));
        assert!(!e.is_terminal());

        assert!(matches!(
            Edge::on_success("a", "c").condition,
            EdgeCondition::OnSuccess
        ));
        assert!(matches!(
            Edge::on_failure("a", "d").condition,
            EdgeCondition::OnFailure
        ));
        assert!(Edge::always("publisher", END).is_terminal());
    }

    #[test]
    fn test_matches_by_outcome() {
        let ctx = HashMap::new();
        assert!(Edge::on_success("a", "b").matches(true, &ctx));
        assert!(!Edge::on_success("a", "b").matches(false, &ctx));
        assert!(Edge::on_failure("a", "b").matches(false, &ctx));
        assert!(Edge::always("a", "b").matches(false, &ctx));
    }

    #[test]
    fn test_condition_equals() {
        let ctx = signals(&[("plan_review", "accept")]);
        assert!(evaluate_condition(r#"plan_review == "accept""#, &ctx));
        assert!(!evaluate_condition(r#"plan_review == "revise""#, &ctx));
    }

    #[test]
    fn test_condition_not_equals() {
        let ctx = signals(&[("writer_status", "success")]);
        assert!(evaluate_condition(r#"writer_status != "failure""#, &ctx));
        assert!(!evaluate_condition(r#"writer_status != "success""#, &ctx));
    }

    #[test]
    fn test_condition_contains() {
        let ctx = signals(&[("writer_error", "Article failed validation: missing title")]);
        assert!(evaluate_condition(r#"writer_error contains "validation""#, &ctx));
        assert!(!evaluate_condition(r#"writer_error contains "timeout""#, &ctx));
    }

    #[test]
    fn test_condition_missing_key_or_invalid() {
        let ctx = HashMap::new();
        assert!(!evaluate_condition(r#"missing == "value""#, &ctx));
        assert!(!evaluate_condition("this is not valid", &ctx));
        assert!(!evaluate_condition(r#" == "value""#, &ctx));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let edge = Edge::conditional("reviewer", "reviser", r#"review == "revise""#);
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains(r#""type":"conditional""#));
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to, "reviser");
        assert!(matches!(parsed.condition, EdgeCondition::Conditional { .. }));
    }
}
