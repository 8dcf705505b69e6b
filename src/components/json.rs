use serde_json::Value;

use super::Component;
use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::{EventBus, BEFORE_DISPATCH};
use crate::server::Request;
use crate::view::ViewKind;

/// Serves the same actions as JSON when the client asks for it.
///
/// A request asks for JSON with `?alt=json` or `Accept: application/json`.
/// The switch happens on `before_dispatch`, so actions can still change the
/// view back.
#[derive(Debug, Default)]
pub struct Json {
    pub render_as_json: bool,
}

impl Json {
    pub fn wants_json(request: &Request) -> bool {
        request.query_param("alt") == Some("json") || request.accepts_json()
    }

    /// Context variables tried, in order, when picking the JSON payload.
    pub fn try_vars(ctx: &RequestContext) -> Vec<String> {
        let desc = ctx.descriptor();
        vec![
            "data".to_string(),
            desc.plural(),
            desc.singular(),
            "edited_item".to_string(),
            "added_item".to_string(),
            "item".to_string(),
        ]
    }

    /// The first present `try_vars` entry, or the whole context.
    pub fn payload(ctx: &RequestContext) -> Value {
        Self::try_vars(ctx)
            .iter()
            .find_map(|name| ctx.context.get(name).cloned())
            .unwrap_or_else(|| ctx.context.as_value())
    }
}

impl Component for Json {
    fn build(
        _ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        events.on(BEFORE_DISPATCH, |ctx, _payload| {
            if Json::wants_json(&ctx.request) {
                if let Some(json) = ctx.components.get_mut::<Json>() {
                    json.render_as_json = true;
                }
                ctx.change_view(ViewKind::Json);
            }
            Ok(None)
        });
        Ok(Json::default())
    }
}
