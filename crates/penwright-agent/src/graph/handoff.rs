use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// String-keyed signals shared between graph nodes.
///
/// Nodes write routing decisions here (`plan_review = "accept"`, ...) and the
/// executor records `{node}_status` / `{node}_error` after every step.
/// Conditional edges are evaluated against this map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffContext {
    data: HashMap<String, serde_json::Value>,
}

impl HandoffContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Keys currently set, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.data.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut ctx = HandoffContext::new();
        ctx.set_str("plan_review", "accept");
        ctx.set("revisions", serde_json::json!(2));

        assert_eq!(ctx.get_str("plan_review"), Some("accept"));
        assert_eq!(ctx.get("revisions"), Some(&serde_json::json!(2)));
        assert_eq!(ctx.get_str("revisions"), None);
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let mut ctx = HandoffContext::new();
        ctx.set_str("review", "revise");
        ctx.set_str("review", "accept");
        assert_eq!(ctx.get_str("review"), Some("accept"));

        assert!(ctx.remove("review").is_some());
        assert!(ctx.data().is_empty());
    }

    #[test]
    fn test_keys_sorted() {
        let mut ctx = HandoffContext::new();
        ctx.set_str("writer_status", "success");
        ctx.set_str("browser_status", "success");
        assert_eq!(ctx.keys(), vec!["browser_status", "writer_status"]);
    }
}
