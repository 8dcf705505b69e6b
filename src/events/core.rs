use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::error::DispatchError;
use crate::responses::Reply;

pub const BEFORE_BUILD_COMPONENTS: &str = "before_build_components";
pub const AFTER_BUILD_COMPONENTS: &str = "after_build_components";
pub const BEFORE_STARTUP: &str = "before_startup";
pub const AFTER_STARTUP: &str = "after_startup";
pub const IS_AUTHORIZED: &str = "is_authorized";
pub const BEFORE_DISPATCH: &str = "before_dispatch";
pub const AFTER_DISPATCH: &str = "after_dispatch";
pub const BEFORE_RENDER: &str = "before_render";
pub const AFTER_RENDER: &str = "after_render";
pub const DISPATCH_COMPLETE: &str = "dispatch_complete";

/// Lifecycle event names in firing order.
pub const LIFECYCLE: [&str; 10] = [
    BEFORE_BUILD_COMPONENTS,
    AFTER_BUILD_COMPONENTS,
    BEFORE_STARTUP,
    AFTER_STARTUP,
    IS_AUTHORIZED,
    BEFORE_DISPATCH,
    AFTER_DISPATCH,
    BEFORE_RENDER,
    AFTER_RENDER,
    DISPATCH_COMPLETE,
];

/// Fired while resolving template names; the payload is `Payload::Templates`.
pub const TEMPLATE_NAMES: &str = "template_names";
pub const SCAFFOLD_BEFORE_SAVE: &str = "scaffold_before_save";
pub const SCAFFOLD_AFTER_SAVE: &str = "scaffold_after_save";
pub const SCAFFOLD_BEFORE_DELETE: &str = "scaffold_before_delete";
pub const SCAFFOLD_AFTER_DELETE: &str = "scaffold_after_delete";

/// Keyword payload handed to every listener of one `fire` call.
#[derive(Debug)]
pub enum Payload<'a> {
    None,
    /// `after_dispatch`: the value the action returned.
    Reply(&'a Reply),
    /// `after_render`: the rendered body.
    Rendered(&'a str),
    /// `template_names`: candidate template names, in lookup order.
    Templates(&'a mut Vec<String>),
    /// Scaffold save/delete events: the entity about to be written or removed.
    Entity(&'a mut Value),
}

/// Error returned by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The listener vetoes the operation. During `is_authorized` the message
    /// becomes the 403 body.
    Rejected(String),
    /// The listener itself failed.
    Failed(String),
}

impl EventError {
    pub fn message(&self) -> &str {
        match self {
            EventError::Rejected(msg) | EventError::Failed(msg) => msg,
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Rejected(msg) => write!(f, "rejected: {msg}"),
            EventError::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

impl std::error::Error for EventError {}

impl From<DispatchError> for EventError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Forbidden(msg) => EventError::Rejected(msg),
            other => EventError::Failed(other.to_string()),
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener<C> =
    Arc<dyn Fn(&mut C, &mut Payload<'_>) -> Result<Option<Value>, EventError> + Send + Sync>;

/// Ordered, name-keyed listener registry.
///
/// `C` is the state handed to listeners by mutable reference; the dispatcher
/// uses `EventBus<RequestContext>`.
pub struct EventBus<C> {
    listeners: HashMap<String, Vec<(ListenerId, Listener<C>)>>,
    next_id: u64,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<C> Clone for EventBus<C> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id,
        }
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `name`. Listeners run in registration order.
    pub fn on<F>(&mut self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&mut C, &mut Payload<'_>) -> Result<Option<Value>, EventError>
            + Send
            + Sync
            + 'static,
    {
        self.on_shared(name, Arc::new(listener))
    }

    /// Register an already shared listener.
    pub fn on_shared(&mut self, name: impl Into<String>, listener: Listener<C>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(name.into())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered under `name`.
    pub fn off(&mut self, name: &str, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(name);
        }
        removed
    }

    /// Invoke every listener of `name` in order and collect the values they return.
    ///
    /// Stops at the first listener error and returns it. Unknown names yield an
    /// empty vector.
    pub fn fire(
        &self,
        name: &str,
        ctx: &mut C,
        payload: &mut Payload<'_>,
    ) -> Result<Vec<Value>, EventError> {
        let Some(list) = self.listeners.get(name) else {
            return Ok(Vec::new());
        };
        trace!(event = %name, listeners = list.len(), "Firing event");
        let mut results = Vec::new();
        for (_, listener) in list {
            if let Some(value) = listener(ctx, payload)? {
                results.push(value);
            }
        }
        Ok(results)
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners.get(name).is_some_and(|l| !l.is_empty())
    }

    /// Total number of registered listeners across all names.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
