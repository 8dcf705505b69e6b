use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::components::{flash, FlashMessages, Pagination};
use crate::controller::{ActionFn, Args, RequestContext};
use crate::error::DispatchError;
use crate::events::{
    EventError, Payload, SCAFFOLD_AFTER_DELETE, SCAFFOLD_AFTER_SAVE, SCAFFOLD_BEFORE_DELETE,
    SCAFFOLD_BEFORE_SAVE,
};
use crate::inflector;
use crate::parsers::ParsedValue;
use crate::responses::Reply;

use super::Store;

/// Request parameter that suppresses the post-save redirect.
pub const NO_REDIRECT_PARAM: &str = "__no_redirect";

/// Generated handler for a conventional action name.
pub fn scaffold_action(action: &str) -> Option<ActionFn> {
    let handler: ActionFn = match action {
        "list" => Arc::new(list),
        "view" => Arc::new(view),
        "add" => Arc::new(add),
        "edit" => Arc::new(edit),
        "delete" => Arc::new(delete),
        _ => return None,
    };
    Some(handler)
}

fn model(ctx: &RequestContext) -> Result<Arc<dyn Store>, DispatchError> {
    ctx.descriptor().model.clone().ok_or_else(|| {
        DispatchError::Internal(format!("controller '{}' has no store", ctx.name()))
    })
}

fn entity_id(args: &Args) -> Result<String, DispatchError> {
    args.get("id")
        .map(str::to_string)
        .ok_or_else(|| DispatchError::BadRequest("missing argument 'id'".to_string()))
}

fn is_read(ctx: &RequestContext) -> bool {
    ctx.request.method == Method::GET || ctx.request.method == Method::HEAD
}

/// Listener vetoes become 400s; other listener failures stay 500s.
fn fire_entity(ctx: &mut RequestContext, event: &str, entity: &mut Value) -> Result<(), DispatchError> {
    match ctx.fire(event, &mut Payload::Entity(entity)) {
        Ok(_) => Ok(()),
        Err(EventError::Rejected(msg)) => Err(DispatchError::BadRequest(msg)),
        Err(err) => Err(err.into()),
    }
}

fn should_redirect(ctx: &RequestContext) -> bool {
    ctx.descriptor().scaffold.redirect
        && !ctx.request.has_param(NO_REDIRECT_PARAM)
        && !ctx.is_structured_view()
}

fn notify(ctx: &mut RequestContext, verb: &str) {
    if ctx.descriptor().scaffold.flash_messages && ctx.components.contains_type::<FlashMessages>() {
        let singular = inflector::titleize(&ctx.descriptor().singular());
        flash(ctx, format!("{singular} {verb}"), "success");
    }
}

fn redirect_to_list(ctx: &mut RequestContext) -> Result<Reply, DispatchError> {
    let prefix = ctx.route.prefix.clone();
    let uri = ctx.uri_for_action(prefix.as_deref(), "list", &[])?;
    Ok(ctx.redirect(&uri))
}

/// Re-render the form with its errors. JSON callers get a 400.
fn invalid(ctx: &mut RequestContext, parsed: ParsedValue) -> Result<Reply, DispatchError> {
    debug!(
        controller = %ctx.name(),
        action = %ctx.route.action,
        errors = parsed.errors.len(),
        "Scaffold form rejected"
    );
    ctx.context.set("errors", &parsed.errors)?;
    ctx.context.insert("form", parsed.data);
    if ctx.is_structured_view() {
        ctx.response.status = 400;
    }
    Ok(Reply::None)
}

fn save(
    ctx: &mut RequestContext,
    store: &dyn Store,
    id: Option<&str>,
    mut entity: Value,
) -> Result<Value, DispatchError> {
    fire_entity(ctx, SCAFFOLD_BEFORE_SAVE, &mut entity)?;
    let mut saved = store.put(id, entity)?;
    fire_entity(ctx, SCAFFOLD_AFTER_SAVE, &mut saved)?;
    Ok(saved)
}

/// The Pagination listener skips requests whose collection is already set.
fn list(ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
    Pagination::paginate(ctx)?;
    Ok(Reply::None)
}

fn view(ctx: &mut RequestContext, args: &Args) -> Result<Reply, DispatchError> {
    let store = model(ctx)?;
    let id = entity_id(args)?;
    let Some(entity) = store.get(&id)? else {
        return Ok(Reply::Status(404));
    };
    let singular = ctx.descriptor().singular();
    ctx.context.insert(singular, entity);
    Ok(Reply::None)
}

fn add(ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
    let store = model(ctx)?;
    let template = store.template();
    if is_read(ctx) {
        ctx.context.insert("form", template);
        return Ok(Reply::None);
    }

    let parsed = ctx.parse_request_value(&template, None)?;
    if !parsed.is_valid() {
        return invalid(ctx, parsed);
    }
    let saved = save(ctx, store.as_ref(), None, parsed.data)?;
    debug!(controller = %ctx.name(), id = ?saved.get("id"), "Scaffold entity added");
    ctx.context.insert("added_item", saved);
    notify(ctx, "added");
    if should_redirect(ctx) {
        return redirect_to_list(ctx);
    }
    Ok(Reply::None)
}

fn edit(ctx: &mut RequestContext, args: &Args) -> Result<Reply, DispatchError> {
    let store = model(ctx)?;
    let id = entity_id(args)?;
    let Some(existing) = store.get(&id)? else {
        return Ok(Reply::Status(404));
    };
    if is_read(ctx) {
        let singular = ctx.descriptor().singular();
        ctx.context.insert(singular, existing.clone());
        ctx.context.insert("form", existing);
        return Ok(Reply::None);
    }

    let parsed = ctx.parse_request_value(&store.template(), Some(&existing))?;
    if !parsed.is_valid() {
        return invalid(ctx, parsed);
    }
    let saved = save(ctx, store.as_ref(), Some(&id), parsed.data)?;
    debug!(controller = %ctx.name(), id = %id, "Scaffold entity updated");
    ctx.context.insert("edited_item", saved);
    notify(ctx, "updated");
    if should_redirect(ctx) {
        return redirect_to_list(ctx);
    }
    Ok(Reply::None)
}

fn delete(ctx: &mut RequestContext, args: &Args) -> Result<Reply, DispatchError> {
    let store = model(ctx)?;
    let id = entity_id(args)?;
    let Some(mut existing) = store.get(&id)? else {
        return Ok(Reply::Status(404));
    };
    fire_entity(ctx, SCAFFOLD_BEFORE_DELETE, &mut existing)?;
    store.delete(&id)?;
    fire_entity(ctx, SCAFFOLD_AFTER_DELETE, &mut existing)?;
    debug!(controller = %ctx.name(), id = %id, "Scaffold entity deleted");
    notify(ctx, "deleted");
    if should_redirect(ctx) {
        return redirect_to_list(ctx);
    }
    Ok(Reply::from((204u16, String::new())))
}
