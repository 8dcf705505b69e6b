use serde_json::{json, Value};

use super::Component;
use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::{EventBus, Payload, BEFORE_RENDER, TEMPLATE_NAMES};
use crate::view;

/// View support for generated CRUD actions.
///
/// Added automatically to every controller with scaffold actions. Exposes
/// `context["scaffolding"]`, aliases the collection and item variables as
/// `items` and `item`, and falls back to the shared `scaffolding/`
/// templates when the controller has none of its own.
#[derive(Debug, Default)]
pub struct Scaffolding;

impl Scaffolding {
    /// Metadata the scaffold templates render from.
    pub fn metadata(ctx: &RequestContext) -> Value {
        let desc = ctx.descriptor();
        let display_properties = if desc.scaffold.display_properties.is_empty() {
            desc.model.as_ref().map(|m| m.fields()).unwrap_or_default()
        } else {
            desc.scaffold.display_properties.clone()
        };
        let prefix = ctx.route.prefix.as_deref();
        json!({
            "name": desc.name,
            "proper_name": desc.type_name,
            "title": desc.title(),
            "plural": desc.plural(),
            "singular": desc.singular(),
            "display_properties": display_properties,
            "prefix": prefix,
            "action": ctx.route.action,
            "list_uri": ctx.uri_for_action(prefix, "list", &[]).ok(),
            "add_uri": ctx.uri_for_action(prefix, "add", &[]).ok(),
        })
    }
}

impl Component for Scaffolding {
    fn build(
        _ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        events.on(BEFORE_RENDER, |ctx, _payload| {
            let metadata = Scaffolding::metadata(ctx);
            ctx.context.insert("scaffolding", metadata);
            let desc = ctx.descriptor_arc();
            for (alias, name) in [("items", desc.plural()), ("item", desc.singular())] {
                if !ctx.context.contains(alias) {
                    if let Some(value) = ctx.context.get(&name).cloned() {
                        ctx.context.insert(alias, value);
                    }
                }
            }
            Ok(None)
        });
        events.on(TEMPLATE_NAMES, |ctx, payload| {
            if let Payload::Templates(names) = payload {
                let ext = view::template_extension(ctx);
                if let Some(prefix) = &ctx.route.prefix {
                    names.push(format!("scaffolding/{prefix}_{}.{ext}", ctx.route.action));
                }
                names.push(format!("scaffolding/{}.{ext}", ctx.route.action));
            }
            Ok(None)
        });
        Ok(Scaffolding)
    }
}
