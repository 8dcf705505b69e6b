//! # Request Parsers
//!
//! Parsers turn an inbound request into structured data shaped like a
//! template value. Two strategies ship by default:
//!
//! - [`FormParser`] merges query and form (or flattened JSON) fields onto the
//!   template, coercing each string to the template field's JSON type. Fields
//!   the request does not mention keep the fallback's value.
//! - [`MessageParser`] decodes the JSON body straight into the target type.
//!
//! Neither strategy fails the request. Problems are collected as
//! [`FieldError`]s and reported through [`Parsed::validate`], leaving the
//! action to decide how to answer.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::{ConfigurationError, DispatchError};
use crate::server::Request;

/// A validation problem with one field, or with the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Untyped parser output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub data: Value,
    pub errors: Vec<FieldError>,
}

impl ParsedValue {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A parsing strategy.
pub trait RequestParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse `request` into a value shaped like `template`, starting from
    /// `fallback` when given.
    fn process(&self, request: &Request, template: &Value, fallback: Option<&Value>)
        -> ParsedValue;
}

/// Merges request parameters onto a template object.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormParser;

impl FormParser {
    /// Source pairs: flattened JSON body, or query plus form fields.
    fn source_pairs(request: &Request) -> Result<Vec<(String, Value)>, FieldError> {
        if request.is_json() {
            let body: Value = serde_json::from_slice(&request.body)
                .map_err(|e| FieldError::new(None, e.to_string()))?;
            let mut pairs = Vec::new();
            flatten("", &body, &mut pairs);
            return Ok(pairs);
        }
        Ok(request
            .params()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect())
    }
}

impl RequestParser for FormParser {
    fn name(&self) -> &'static str {
        "FormParser"
    }

    fn process(
        &self,
        request: &Request,
        template: &Value,
        fallback: Option<&Value>,
    ) -> ParsedValue {
        let mut data = fallback.unwrap_or(template).clone();
        let mut errors = Vec::new();

        let pairs = match Self::source_pairs(request) {
            Ok(pairs) => pairs,
            Err(err) => {
                return ParsedValue {
                    data,
                    errors: vec![err],
                }
            }
        };

        // Collect repeated keys first so array fields see every value.
        let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
        for (key, value) in pairs {
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key, vec![value])),
            }
        }

        for (key, values) in grouped {
            let Some(kind) = lookup(template, &key) else {
                continue;
            };
            match coerce(kind, values) {
                Ok(value) => assign(&mut data, &key, value),
                Err(message) => errors.push(FieldError::new(Some(&key), message)),
            }
        }

        debug!(
            parser = self.name(),
            errors = errors.len(),
            "Request parsed"
        );
        ParsedValue { data, errors }
    }
}

/// Decodes a JSON body directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageParser;

impl RequestParser for MessageParser {
    fn name(&self) -> &'static str {
        "MessageParser"
    }

    fn process(
        &self,
        request: &Request,
        template: &Value,
        fallback: Option<&Value>,
    ) -> ParsedValue {
        match serde_json::from_slice::<Value>(&request.body) {
            Ok(data) => ParsedValue {
                data,
                errors: Vec::new(),
            },
            Err(err) => ParsedValue {
                data: fallback.unwrap_or(template).clone(),
                errors: vec![FieldError::new(None, err.to_string())],
            },
        }
    }
}

/// Typed parser output.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    data: Option<T>,
    raw: Value,
    errors: Vec<FieldError>,
}

impl<T: DeserializeOwned> Parsed<T> {
    /// Deserialize the parsed value into `T`; a mismatch becomes a payload error.
    pub fn from_value(value: ParsedValue) -> Self {
        let ParsedValue { data, mut errors } = value;
        let typed = match serde_json::from_value::<T>(data.clone()) {
            Ok(typed) => Some(typed),
            Err(err) => {
                errors.push(FieldError::new(None, err.to_string()));
                None
            }
        };
        Self {
            data: typed,
            raw: data,
            errors,
        }
    }
}

impl<T> Parsed<T> {
    /// `true` when the payload decoded without errors.
    pub fn validate(&self) -> bool {
        self.errors.is_empty() && self.data.is_some()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_inner(self) -> Option<T> {
        self.data
    }

    /// Copy every parsed field onto `target`, leaving its other fields alone.
    pub fn update<U>(&self, target: &mut U) -> Result<(), DispatchError>
    where
        U: Serialize + DeserializeOwned,
    {
        let mut current = serde_json::to_value(&*target)?;
        merge(&mut current, &self.raw);
        *target = serde_json::from_value(current)?;
        Ok(())
    }
}

/// Parsers by name.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn RequestParser>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parsers.iter().map(|p| p.name()))
            .finish()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FormParser));
        registry.register(Arc::new(MessageParser));
        registry
    }

    /// Later registrations shadow earlier ones with the same name.
    pub fn register(&mut self, parser: Arc<dyn RequestParser>) {
        self.parsers.insert(0, parser);
    }

    /// Find a parser by name: `form`, `Form`, `FormParser` all work.
    pub fn factory(&self, name: &str) -> Result<Arc<dyn RequestParser>, ConfigurationError> {
        let wanted = name.to_ascii_lowercase();
        self.parsers
            .iter()
            .find(|p| {
                let have = p.name().to_ascii_lowercase();
                have == wanted || have == format!("{wanted}parser")
            })
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownParser {
                name: name.to_string(),
            })
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        Value::Array(items) if !prefix.is_empty() => {
            for item in items {
                out.push((prefix.to_string(), item.clone()));
            }
        }
        other if !prefix.is_empty() => out.push((prefix.to_string(), other.clone())),
        _ => {}
    }
}

fn lookup<'a>(template: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(template, |node, part| node.as_object()?.get(part))
}

fn assign(data: &mut Value, path: &str, value: Value) {
    let mut node = data;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        node = map.entry(part.to_string()).or_insert(Value::Null);
    }
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Convert raw request values to the JSON type of the template field.
fn coerce(kind: &Value, values: Vec<Value>) -> Result<Value, String> {
    if let Value::Array(template_items) = kind {
        let item_kind = template_items.first().unwrap_or(&Value::Null);
        return values
            .into_iter()
            .map(|v| coerce_one(item_kind, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    let value = values.into_iter().last().unwrap_or(Value::Null);
    coerce_one(kind, value)
}

fn coerce_one(kind: &Value, value: Value) -> Result<Value, String> {
    let raw = match value {
        Value::String(raw) => raw,
        other => return coerce_json(kind, other),
    };
    let trimmed = raw.trim();
    match kind {
        Value::Number(n) if n.is_f64() => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{raw}' is not a number")),
        Value::Number(_) => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{raw}' is not an integer")),
        Value::Bool(_) => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
            "false" | "off" | "0" | "no" | "n" | "" => Ok(Value::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        },
        Value::Null if raw.is_empty() => Ok(Value::Null),
        _ => Ok(Value::String(raw)),
    }
}

/// Non-string values from a JSON body pass through when the types agree.
fn coerce_json(kind: &Value, value: Value) -> Result<Value, String> {
    match (kind, &value) {
        (Value::Number(_), Value::Number(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Null, _)
        | (Value::Object(_), Value::Object(_)) => Ok(value),
        (Value::String(_), Value::Number(_) | Value::Bool(_)) => {
            Ok(Value::String(value.to_string()))
        }
        _ => Err(format!("unexpected value {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
        count: i64,
        price: f64,
        active: bool,
        tags: Vec<String>,
    }

    fn template() -> Value {
        json!({"name": "", "count": 0, "price": 0.0, "active": false, "tags": [""]})
    }

    #[test]
    fn test_form_coerces_to_template_types() {
        let req = Request::post("/widgets/add").with_form(&[
            ("name", "Sprocket"),
            ("count", "3"),
            ("price", "2.5"),
            ("active", "on"),
            ("tags", "a"),
            ("tags", "b"),
            ("ignored", "x"),
        ]);
        let parsed = FormParser.process(&req, &template(), None);
        assert!(parsed.is_valid());
        assert_eq!(
            parsed.data,
            json!({"name": "Sprocket", "count": 3, "price": 2.5, "active": true, "tags": ["a", "b"]})
        );
    }

    #[test]
    fn test_form_keeps_fallback_on_bad_value() {
        let req = Request::post("/").with_form(&[("count", "many"), ("name", "Cog")]);
        let fallback = json!({"name": "Old", "count": 7, "price": 1.0, "active": true, "tags": []});
        let parsed = FormParser.process(&req, &template(), Some(&fallback));
        assert!(!parsed.is_valid());
        assert_eq!(parsed.errors[0].field.as_deref(), Some("count"));
        assert_eq!(parsed.data["count"], json!(7));
        assert_eq!(parsed.data["name"], json!("Cog"));
        assert_eq!(parsed.data["active"], json!(true));
    }

    #[test]
    fn test_form_flattens_json_body() {
        let template = json!({"name": "", "dims": {"w": 0, "h": 0}});
        let req = Request::post("/").with_json(&json!({"name": "Box", "dims": {"w": "4", "h": 5}}));
        let parsed = FormParser.process(&req, &template, None);
        assert!(parsed.is_valid(), "{:?}", parsed.errors);
        assert_eq!(parsed.data, json!({"name": "Box", "dims": {"w": 4, "h": 5}}));
    }

    #[test]
    fn test_message_parser_reports_decode_errors() {
        let req = Request::post("/").with_body("application/json", "{not json");
        let parsed = MessageParser.process(&req, &template(), None);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].field.is_none());
        assert_eq!(parsed.data, template());
    }

    #[test]
    fn test_typed_parse_and_update() {
        let req = Request::post("/").with_form(&[("name", "Gear"), ("count", "9")]);
        let parsed: Parsed<Widget> =
            Parsed::from_value(FormParser.process(&req, &template(), None));
        assert!(parsed.validate());
        assert_eq!(parsed.data().unwrap().count, 9);

        let mut existing = Widget {
            name: "Old".into(),
            count: 1,
            price: 4.0,
            active: true,
            tags: vec!["x".into()],
        };
        let req = Request::post("/").with_json(&json!({"count": 2}));
        let parsed: Parsed<Value> = Parsed::from_value(MessageParser.process(&req, &json!({}), None));
        parsed.update(&mut existing).unwrap();
        assert_eq!(existing.count, 2);
        assert_eq!(existing.name, "Old");
        assert_eq!(existing.price, 4.0);
    }

    #[test]
    fn test_typed_mismatch_fails_validation() {
        let req = Request::post("/").with_json(&json!({"name": 5}));
        let parsed: Parsed<Widget> =
            Parsed::from_value(MessageParser.process(&req, &template(), None));
        assert!(!parsed.validate());
        assert!(parsed.into_inner().is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.factory("Form").unwrap().name(), "FormParser");
        assert_eq!(registry.factory("messageparser").unwrap().name(), "MessageParser");
        assert_eq!(
            registry.factory("xml").unwrap_err(),
            ConfigurationError::UnknownParser { name: "xml".into() }
        );
    }
}
