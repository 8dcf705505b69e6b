use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::error::StoreError;

/// One page of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    /// Opaque cursor for the following page.
    pub next_cursor: Option<String>,
    pub more: bool,
}

/// Storage contract used by scaffolded controllers and pagination.
///
/// Entities are JSON objects carrying a string `id`. Cursors are opaque to
/// callers; a store only has to accept the cursors it produced.
pub trait Store: Send + Sync {
    /// Entity kind, for logs and diagnostics.
    fn kind(&self) -> &str;

    /// Field names shown by scaffold views.
    fn fields(&self) -> Vec<String>;

    /// A blank entity; the shape forms are parsed against.
    fn template(&self) -> Value;

    fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Store `entity` under `id`, or under a fresh id when `None`. Returns
    /// the stored entity with its `id` set.
    fn put(&self, id: Option<&str>, entity: Value) -> Result<Value, StoreError>;

    /// Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    fn query(&self, limit: usize, cursor: Option<&str>) -> Result<Page, StoreError>;
}

/// In-memory [`Store`] with sequential numeric ids.
///
/// The cursor is the decimal offset of the next item.
#[derive(Debug)]
pub struct MemoryStore {
    kind: String,
    template: Value,
    entities: RwLock<BTreeMap<u64, Value>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// `template` must be a JSON object; its keys become the entity fields.
    pub fn new(kind: impl Into<String>, template: Value) -> Self {
        Self {
            kind: kind.into(),
            template,
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store a new entity under a fresh id.
    pub fn insert(&self, entity: Value) -> Result<Value, StoreError> {
        self.put(None, entity)
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

impl Store for MemoryStore {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn fields(&self) -> Vec<String> {
        self.template
            .as_object()
            .map(|fields| fields.keys().filter(|k| *k != "id").cloned().collect())
            .unwrap_or_default()
    }

    fn template(&self) -> Value {
        self.template.clone()
    }

    fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let Ok(key) = id.parse::<u64>() else {
            return Ok(None);
        };
        let entities = self.entities.read().map_err(poisoned)?;
        Ok(entities.get(&key).cloned())
    }

    fn put(&self, id: Option<&str>, entity: Value) -> Result<Value, StoreError> {
        let Value::Object(mut fields) = entity else {
            return Err(StoreError::Rejected(format!(
                "{} entities must be JSON objects",
                self.kind
            )));
        };
        let key = match id {
            Some(id) => id
                .parse::<u64>()
                .map_err(|_| StoreError::Rejected(format!("invalid id '{id}'")))?,
            None => self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        fields.insert("id".to_string(), Value::String(key.to_string()));
        let stored = Value::Object(fields);
        let mut entities = self.entities.write().map_err(poisoned)?;
        entities.insert(key, stored.clone());
        self.next_id.fetch_max(key + 1, Ordering::Relaxed);
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Ok(key) = id.parse::<u64>() else {
            return Ok(false);
        };
        let mut entities = self.entities.write().map_err(poisoned)?;
        Ok(entities.remove(&key).is_some())
    }

    fn query(&self, limit: usize, cursor: Option<&str>) -> Result<Page, StoreError> {
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidCursor(cursor.to_string()))?,
            None => 0,
        };
        let entities = self.entities.read().map_err(poisoned)?;
        let items: Vec<Value> = entities.values().skip(offset).take(limit).cloned().collect();
        let end = offset + items.len();
        let more = end < entities.len();
        Ok(Page {
            items,
            next_cursor: more.then(|| end.to_string()),
            more,
        })
    }
}

/// Blank entity with the given string fields, for quick stores.
pub fn string_template(fields: &[&str]) -> Value {
    let mut map = Map::new();
    for field in fields {
        map.insert(field.to_string(), Value::String(String::new()));
    }
    Value::Object(map)
}
