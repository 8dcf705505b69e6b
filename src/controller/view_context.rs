use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Variables handed to the view, addressable by dotted key paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewContext {
    values: Map<String, Value>,
}

impl ViewContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` and store it under `key`.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), DispatchError> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// `get_dotted("scaffolding.title")` walks nested objects.
    pub fn get_dotted(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.values.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Store `value` at a dotted path, creating intermediate objects and
    /// replacing any non-object value found on the way.
    pub fn set_dotted(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut current = &mut self.values;
        for part in parts {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
