use serde_json::{json, Value};
use tracing::debug;

use super::Component;
use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::{EventBus, EventError, Payload, AFTER_DISPATCH};
use crate::responses::Reply;

/// Fills list views with one page of the controller's store.
///
/// Runs on `after_dispatch` for actions whose name contains `list` when the
/// action returned nothing and left the collection variable unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub max_limit: usize,
}

impl Pagination {
    fn from_context(ctx: &RequestContext) -> Self {
        let config = &ctx.config().pagination;
        Self {
            limit: ctx
                .descriptor()
                .paginate_limit
                .unwrap_or(config.default_limit),
            max_limit: config.max_limit.max(1),
        }
    }

    /// Query one page and expose it as `context[plural]` and `context["paging"]`.
    ///
    /// `limit` and `cursor` come from the request parameters. The limit is
    /// clamped to `1..=max_limit`.
    pub fn paginate(ctx: &mut RequestContext) -> Result<(), DispatchError> {
        let settings = ctx
            .components
            .get::<Pagination>()
            .copied()
            .unwrap_or_else(|| Pagination::from_context(ctx));
        let limit = ctx
            .request
            .param("limit")
            .and_then(|l| l.parse::<usize>().ok())
            .unwrap_or(settings.limit)
            .clamp(1, settings.max_limit);
        let cursor = ctx.request.param("cursor").filter(|c| !c.is_empty());

        let store = ctx.descriptor().model.clone().ok_or_else(|| {
            DispatchError::Internal(format!(
                "controller '{}' has no store to paginate",
                ctx.descriptor().name
            ))
        })?;
        let page = store.query(limit, cursor.as_deref())?;
        debug!(
            controller = %ctx.descriptor().name,
            limit,
            cursor = ?cursor,
            items = page.items.len(),
            more = page.more,
            "Paginated query"
        );

        let next_cursor = if page.more { page.next_cursor } else { None };
        let plural = ctx.descriptor().plural();
        ctx.context.insert(plural, Value::Array(page.items));
        ctx.context.insert(
            "paging",
            json!({
                "cursor": cursor,
                "next_cursor": next_cursor,
                "limit": limit,
                "more": page.more,
            }),
        );
        Ok(())
    }
}

impl Component for Pagination {
    fn build(
        ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        events.on(AFTER_DISPATCH, |ctx, payload| {
            let returned_nothing = matches!(payload, Payload::Reply(Reply::None));
            if returned_nothing
                && ctx.route.action.contains("list")
                && ctx.descriptor().model.is_some()
                && !ctx.context.contains(&ctx.descriptor().plural())
            {
                Pagination::paginate(ctx).map_err(EventError::from)?;
            }
            Ok(None)
        });
        Ok(Pagination::from_context(ctx))
    }
}
