use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::components::{FlashMessages, Json, Pagination};
use crate::config::AppConfig;
use crate::controller::{ActionSpec, ControllerDescriptor};
use crate::dispatcher::{AppBuilder, Dispatcher};
use crate::error::ConfigurationError;
use crate::responses::Reply;
use crate::scaffold::{string_template, MemoryStore, Store};

const SCAFFOLDED: &[&str] = &[
    "list",
    "view",
    "add",
    "edit",
    "delete",
    "admin_list",
    "admin_view",
    "admin_add",
    "admin_edit",
    "admin_delete",
];

/// Widget store seeded with a few rows.
pub fn widget_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new("Widget", string_template(&["name", "colour"]));
    for (name, colour) in [("Sprocket", "red"), ("Gear", "blue"), ("Flange", "green")] {
        if let Err(err) = store.insert(json!({ "name": name, "colour": colour })) {
            warn!(error = %err, "Failed to seed demo widget");
        }
    }
    Arc::new(store)
}

/// The application served by `waypost serve`.
pub fn demo_app(config: AppConfig) -> Result<Dispatcher, ConfigurationError> {
    let store = widget_store();
    let stats_store = Arc::clone(&store);

    let widgets = ControllerDescriptor::builder("Widgets")
        .prefix("admin")
        .model(store)
        .component::<Json>()
        .component::<Pagination>()
        .component::<FlashMessages>()
        .scaffold(SCAFFOLDED)
        .action(
            ActionSpec::new("stats", move |_ctx, _args| {
                Reply::message(&json!({ "kind": stats_store.kind(), "count": stats_store.len() }))
            })
            .route(),
        )
        .action(
            ActionSpec::new("greet", |_ctx, args| {
                Ok(Reply::Text(format!("Hello, {}!", args.get_or("name", "world"))))
            })
            .param_default("name", "world")
            .route(),
        )
        .build()?;

    AppBuilder::new()
        .config(config)
        .controller(widgets)
        .autoadmin(true)
        .build()
}
