//! # Response Handlers
//!
//! Actions return a [`Reply`]. After `after_dispatch` the dispatcher asks the
//! [`ResponseHandlerRegistry`] for a handler matching the reply's
//! [`ReplyKind`], first exactly and then through the kind's parents. When no
//! handler applies (as for [`Reply::None`]) the dispatcher falls through to
//! auto-rendering.
//!
//! | Reply | Default handler |
//! |---|---|
//! | `Text` | body with `text/plain`, pending redirect cleared |
//! | `Status` | [`abort`] with that status |
//! | `Raw` | response built from status, headers and body |
//! | `Response` | passed through unchanged |
//! | `Message` | `Structured` handler: switch to the message view and render |
//! | `Other` | none unless registered with [`ResponseHandlerRegistry::register_type`] |

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::inflector;
use crate::server::response::{status_reason, TEXT_PLAIN};
use crate::server::Response;
use crate::view::{self, ViewKind};

/// A response assembled from parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// A structured domain object rendered by the message view.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub type_name: String,
    pub data: Value,
}

impl Message {
    pub fn new<T: Serialize>(value: &T) -> Result<Self, DispatchError> {
        Ok(Self {
            type_name: inflector::short_type_name(std::any::type_name::<T>()).to_string(),
            data: serde_json::to_value(value)?,
        })
    }
}

/// Any other value; handled only when its type is registered.
pub struct OtherReply {
    value: Box<dyn Any + Send>,
    type_id: TypeId,
    type_name: &'static str,
    debug: String,
}

impl fmt::Debug for OtherReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.debug, self.type_name)
    }
}

impl OtherReply {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        if self.type_id != TypeId::of::<T>() {
            return Err(self);
        }
        let OtherReply {
            value,
            type_id,
            type_name,
            debug,
        } = self;
        value.downcast::<T>().map(|b| *b).map_err(|value| OtherReply {
            value,
            type_id,
            type_name,
            debug,
        })
    }
}

/// What an action returned.
#[derive(Debug)]
pub enum Reply {
    /// Nothing; auto-render applies.
    None,
    Text(String),
    Status(u16),
    Raw(RawReply),
    Response(Response),
    Message(Message),
    Other(OtherReply),
}

impl Reply {
    pub fn other<T: Any + Send + fmt::Debug>(value: T) -> Self {
        Reply::Other(OtherReply {
            debug: format!("{value:?}"),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        })
    }

    pub fn message<T: Serialize>(value: &T) -> Result<Self, DispatchError> {
        Message::new(value).map(Reply::Message)
    }

    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::None => ReplyKind::None,
            Reply::Text(_) => ReplyKind::Text,
            Reply::Status(_) => ReplyKind::Status,
            Reply::Raw(_) => ReplyKind::Raw,
            Reply::Response(_) => ReplyKind::Response,
            Reply::Message(_) => ReplyKind::Message,
            Reply::Other(other) => ReplyKind::Other(other.type_id),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Reply::None => "()",
            Reply::Text(_) => "String",
            Reply::Status(_) => "u16",
            Reply::Raw(_) => "RawReply",
            Reply::Response(_) => "Response",
            Reply::Message(m) => &m.type_name,
            Reply::Other(o) => o.type_name,
        }
    }

    /// Short rendering of the value for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Reply::None => "None".to_string(),
            Reply::Text(s) => format!("{s:?}"),
            Reply::Status(status) => status.to_string(),
            Reply::Raw(raw) => format!("{raw:?}"),
            Reply::Response(res) => format!("Response({})", res.status),
            Reply::Message(m) => m.data.to_string(),
            Reply::Other(o) => o.debug.clone(),
        }
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::None
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Text(s)
    }
}

impl From<u16> for Reply {
    fn from(status: u16) -> Self {
        Reply::Status(status)
    }
}

impl From<Response> for Reply {
    fn from(res: Response) -> Self {
        Reply::Response(res)
    }
}

impl From<Message> for Reply {
    fn from(m: Message) -> Self {
        Reply::Message(m)
    }
}

impl From<(u16, String)> for Reply {
    fn from((status, body): (u16, String)) -> Self {
        Reply::Raw(RawReply {
            status,
            headers: Vec::new(),
            body,
        })
    }
}

impl From<(u16, &str)> for Reply {
    fn from((status, body): (u16, &str)) -> Self {
        Reply::from((status, body.to_string()))
    }
}

impl From<(u16, Vec<(String, String)>, String)> for Reply {
    fn from((status, headers, body): (u16, Vec<(String, String)>, String)) -> Self {
        Reply::Raw(RawReply {
            status,
            headers,
            body,
        })
    }
}

/// Dispatch key for response handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    None,
    Text,
    Status,
    Raw,
    Response,
    Message,
    /// Parent of `Message`.
    Structured,
    Other(TypeId),
    /// Parent of every `Other`.
    Opaque,
}

impl ReplyKind {
    pub fn parent(&self) -> Option<ReplyKind> {
        match self {
            ReplyKind::Message => Some(ReplyKind::Structured),
            ReplyKind::Other(_) => Some(ReplyKind::Opaque),
            _ => None,
        }
    }
}

/// Turns a reply into the final response.
pub trait ResponseHandler: Send + Sync {
    fn process(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError>;
}

impl<F> ResponseHandler for F
where
    F: Fn(&mut RequestContext, Reply) -> Result<Response, DispatchError> + Send + Sync,
{
    fn process(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        self(ctx, reply)
    }
}

struct TextHandler;

impl ResponseHandler for TextHandler {
    fn process(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        let body = match reply {
            Reply::Text(body) => body,
            other => return Err(mismatch("Text", &other)),
        };
        let mut response = std::mem::take(&mut ctx.response);
        response.clear_redirect();
        response.set_text(body);
        Ok(response)
    }
}

struct StatusHandler;

impl ResponseHandler for StatusHandler {
    fn process(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        let status = match reply {
            Reply::Status(status) => status,
            other => return Err(mismatch("Status", &other)),
        };
        Ok(abort(ctx, status, None))
    }
}

struct RawHandler;

impl ResponseHandler for RawHandler {
    fn process(&self, _ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        let raw = match reply {
            Reply::Raw(raw) => raw,
            other => return Err(mismatch("Raw", &other)),
        };
        let mut response = Response::new(raw.status);
        for (name, value) in &raw.headers {
            response.append_header(name, value);
        }
        if response.content_type().is_none() && !raw.body.is_empty() {
            response.set_header("content-type", TEXT_PLAIN);
        }
        response.body = raw.body.into_bytes();
        Ok(response)
    }
}

struct PassThroughHandler;

impl ResponseHandler for PassThroughHandler {
    fn process(&self, _ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        match reply {
            Reply::Response(response) => Ok(response),
            other => Err(mismatch("Response", &other)),
        }
    }
}

/// Renders structured replies through the message view.
struct MessageHandler;

impl ResponseHandler for MessageHandler {
    fn process(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        let message = match reply {
            Reply::Message(message) => message,
            other => return Err(mismatch("Message", &other)),
        };
        ctx.response.clear_redirect();
        ctx.change_view(ViewKind::Message);
        ctx.context.insert("data", message.data);
        view::render(ctx)
    }
}

fn mismatch(handler: &str, reply: &Reply) -> DispatchError {
    DispatchError::Internal(format!(
        "{handler} handler received {}",
        reply.type_name()
    ))
}

/// Handlers keyed by [`ReplyKind`].
#[derive(Clone)]
pub struct ResponseHandlerRegistry {
    handlers: Vec<(ReplyKind, Arc<dyn ResponseHandler>)>,
}

impl fmt::Debug for ResponseHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|(kind, _)| kind))
            .finish()
    }
}

impl Default for ResponseHandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ResponseHandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ReplyKind::Text, Arc::new(TextHandler));
        registry.register(ReplyKind::Status, Arc::new(StatusHandler));
        registry.register(ReplyKind::Raw, Arc::new(RawHandler));
        registry.register(ReplyKind::Response, Arc::new(PassThroughHandler));
        registry.register(ReplyKind::Structured, Arc::new(MessageHandler));
        registry
    }

    /// Register or replace the handler for `kind`.
    pub fn register(&mut self, kind: ReplyKind, handler: Arc<dyn ResponseHandler>) {
        self.handlers.retain(|(k, _)| *k != kind);
        self.handlers.push((kind, handler));
    }

    /// Handle `Reply::other(value)` for values of type `T`.
    pub fn register_type<T: Any>(&mut self, handler: Arc<dyn ResponseHandler>) {
        self.register(ReplyKind::Other(TypeId::of::<T>()), handler);
    }

    /// Exact kind first, then each parent in turn.
    pub fn factory(&self, kind: ReplyKind) -> Option<Arc<dyn ResponseHandler>> {
        let mut current = Some(kind);
        while let Some(kind) = current {
            if let Some((_, handler)) = self.handlers.iter().find(|(k, _)| *k == kind) {
                return Some(Arc::clone(handler));
            }
            current = kind.parent();
        }
        None
    }
}

/// Error response rendered through the active view.
///
/// Structured views get `{"error": .., "status": ..}`; other views get the
/// message as plain text, or an empty body without one. Any pending redirect
/// is dropped.
pub fn abort(ctx: &mut RequestContext, status: u16, message: Option<&str>) -> Response {
    let mut response = std::mem::take(&mut ctx.response);
    response.status = status;
    response.remove_header("location");
    if ctx.view.is_structured() {
        let error = message.unwrap_or_else(|| status_reason(status));
        response.set_json(&json!({ "error": error, "status": status }));
    } else if let Some(message) = message {
        response.set_text(message);
    } else {
        response.body.clear();
        response.remove_header("content-type");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Receipt(u32);

    #[test]
    fn test_conversions() {
        assert!(matches!(Reply::from("hello"), Reply::Text(ref s) if s == "hello"));
        assert!(matches!(Reply::from(404u16), Reply::Status(404)));
        assert!(matches!(Reply::from(()), Reply::None));
        let raw = Reply::from((201u16, vec![("x-id".to_string(), "1".to_string())], "ok".to_string()));
        assert!(matches!(raw, Reply::Raw(RawReply { status: 201, .. })));
    }

    #[test]
    fn test_kind_parents() {
        assert_eq!(ReplyKind::Message.parent(), Some(ReplyKind::Structured));
        assert_eq!(
            Reply::other(Receipt(1)).kind().parent(),
            Some(ReplyKind::Opaque)
        );
        assert_eq!(ReplyKind::Text.parent(), None);
    }

    #[test]
    fn test_factory_walks_parents() {
        let mut registry = ResponseHandlerRegistry::with_defaults();
        assert!(registry.factory(ReplyKind::Text).is_some());
        assert!(registry.factory(ReplyKind::Message).is_some());
        assert!(registry.factory(ReplyKind::None).is_none());
        let receipt = Reply::other(Receipt(7)).kind();
        assert!(registry.factory(receipt).is_none());

        registry.register(
            ReplyKind::Opaque,
            Arc::new(
                |_ctx: &mut RequestContext, _reply: Reply| -> Result<Response, DispatchError> {
                    Ok(Response::new(202))
                },
            ),
        );
        assert!(registry.factory(receipt).is_some());
    }

    #[test]
    fn test_other_reply_downcast_and_describe() {
        let reply = Reply::other(Receipt(9));
        assert_eq!(reply.describe(), "Receipt(9)");
        assert!(reply.type_name().ends_with("Receipt"));
        let Reply::Other(other) = reply else {
            panic!("expected Other");
        };
        assert_eq!(other.downcast_ref::<Receipt>().map(|r| r.0), Some(9));
        let other = other.downcast::<String>().unwrap_err();
        assert_eq!(other.downcast::<Receipt>().unwrap().0, 9);
    }
}
