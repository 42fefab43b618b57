//! Layered deployment settings.
//!
//! Three layers in ascending priority: built-in defaults, the alias file's
//! `deploy` section, and the command line. The lookup is built once before
//! the pipeline is constructed and never mutated afterwards.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Defaults,
    Alias,
    CommandLine,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    // Ascending priority.
    layers: Vec<(Layer, Map<String, Value>)>,
}

impl Settings {
    pub fn new(
        defaults: Map<String, Value>,
        alias: Map<String, Value>,
        command_line: Map<String, Value>,
    ) -> Self {
        let command_line = command_line
            .into_iter()
            .filter(|(_, value)| is_meaningful(value))
            .collect();

        Self {
            layers: vec![
                (Layer::Defaults, defaults),
                (Layer::Alias, alias),
                (Layer::CommandLine, command_line),
            ],
        }
    }

    /// Highest-priority value for `key`, with the layer it came from.
    pub fn lookup(&self, key: &str) -> Option<(Layer, &Value)> {
        self.layers
            .iter()
            .rev()
            .find_map(|(layer, values)| values.get(key).map(|v| (*layer, v)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.lookup(key).map(|(_, value)| value)
    }

    pub fn source(&self, key: &str) -> Option<Layer> {
        self.lookup(key).map(|(layer, _)| layer)
    }

    /// Non-empty string value. Numbers are rendered as strings.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Kill switches and enable flags.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => {
                let s = s.trim();
                !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
            }
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };

        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };

        parsed.map(Some).ok_or_else(|| {
            Error::config_invalid_value(
                key,
                Some(value.to_string()),
                "expected a non-negative integer",
            )
        })
    }

    /// A single command string or an ordered list of them.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Whether a command-line value should override lower layers.
fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}
