use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parser and assignment behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Longer input is rejected before tokenizing.
    pub max_expression_length: usize,
    /// Assigning through a null intermediate property creates an empty map there.
    pub auto_grow_null_references: bool,
    /// Assigning past the end of a list pads it with nulls.
    pub auto_grow_collections: bool,
    /// Largest length a list may grow to by auto-growing.
    pub maximum_auto_grow_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_expression_length: 10_000,
            auto_grow_null_references: false,
            auto_grow_collections: false,
            maximum_auto_grow_size: i32::MAX as usize,
        }
    }
}

impl ParserConfig {
    /// Defaults overridden by `LADLE_MAX_EXPRESSION_LENGTH`,
    /// `LADLE_AUTO_GROW_NULL_REFERENCES` and `LADLE_AUTO_GROW_COLLECTIONS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_var("LADLE_MAX_EXPRESSION_LENGTH") {
            config.max_expression_length = v;
        }
        if let Some(v) = env_var("LADLE_AUTO_GROW_NULL_REFERENCES") {
            config.auto_grow_null_references = v;
        }
        if let Some(v) = env_var("LADLE_AUTO_GROW_COLLECTIONS") {
            config.auto_grow_collections = v;
        }
        config
    }

    pub fn with_auto_grow(mut self, null_references: bool, collections: bool) -> Self {
        self.auto_grow_null_references = null_references;
        self.auto_grow_collections = collections;
        self
    }
}

fn env_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = %key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}

/// Delimiters around the expression fragments of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParserContext {
    pub prefix: String,
    pub suffix: String,
}

impl TemplateParserContext {
    pub fn new<P: Into<String>, S: Into<String>>(prefix: P, suffix: S) -> Self {
        Self { prefix: prefix.into(), suffix: suffix.into() }
    }

    /// `${...}` delimiters.
    pub fn dollar() -> Self {
        Self::new("${", "}")
    }
}

impl Default for TemplateParserContext {
    fn default() -> Self {
        Self::new("#{", "}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config() {
        let config: ParserConfig = serde_json::from_str(r#"{"auto_grow_collections": true}"#).unwrap();
        assert!(config.auto_grow_collections);
        assert_eq!(config.max_expression_length, 10_000);
        assert_eq!(config.maximum_auto_grow_size, i32::MAX as usize);
    }

    #[test]
    fn template_delimiters() {
        assert_eq!(TemplateParserContext::default().prefix, "#{");
        assert_eq!(TemplateParserContext::dollar(), TemplateParserContext::new("${", "}"));
    }
}
