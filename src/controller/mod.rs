//! # Controller Module
//!
//! Controllers group related actions under one URL namespace. They are plain
//! data: a [`ControllerDescriptor`] is assembled once with a builder and then
//! shared, read-only, by every request routed to it.
//!
//! ```rust
//! use waypost::controller::{ActionSpec, ControllerDescriptor};
//! use waypost::responses::Reply;
//!
//! let widgets = ControllerDescriptor::builder("Widgets")
//!     .prefix("admin")
//!     .handler("list", |ctx, _args| {
//!         ctx.context.insert("widgets", serde_json::json!([]));
//!         Ok(Reply::None)
//!     })
//!     .action(
//!         ActionSpec::new("monkey", |_ctx, args| {
//!             Ok(format!("monkey {}", args.get_or("id", "?")).into())
//!         })
//!         .param("id")
//!         .route(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(widgets.name, "widgets");
//! assert!(widgets.action("monkey").unwrap().is_routed());
//! ```
//!
//! Each request gets a [`RequestContext`] holding the request, the working
//! response, the built components, view variables and session.

mod context;
mod descriptor;
mod view_context;

pub use context::{RequestContext, RouteInfo};
pub use descriptor::{
    ActionFn, ActionSpec, Args, ControllerBuilder, ControllerDescriptor, ParamSpec, RouteOptions,
    StartupHook,
};
pub use view_context::ViewContext;
