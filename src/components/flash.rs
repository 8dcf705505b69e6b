use serde_json::{json, Value};

use super::Component;
use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::{EventBus, BEFORE_RENDER};

/// Session key holding messages not yet shown.
pub const FLASH_SESSION_KEY: &str = "__flash";

/// Queue a one-shot message for the next rendered page.
pub fn flash(ctx: &mut RequestContext, message: impl Into<String>, level: &str) {
    let mut pending = match ctx.session.take(FLASH_SESSION_KEY) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    pending.push(json!({ "message": message.into(), "level": level }));
    ctx.session.set(FLASH_SESSION_KEY, Value::Array(pending));
}

/// Moves queued flash messages into `context["flash_messages"]` before rendering.
#[derive(Debug, Default)]
pub struct FlashMessages;

impl Component for FlashMessages {
    fn build(
        _ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        events.on(BEFORE_RENDER, |ctx, _payload| {
            let messages = match ctx.session.take(FLASH_SESSION_KEY) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            ctx.context.insert("flash_messages", Value::Array(messages));
            Ok(None)
        });
        Ok(FlashMessages)
    }
}
