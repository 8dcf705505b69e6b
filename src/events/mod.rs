//! # Events Module
//!
//! Named broadcast events that let components and application code observe or
//! veto each stage of request dispatch.
//!
//! ## Scopes
//!
//! Two buses are consulted for every request:
//!
//! - **Global**: populated on the `AppBuilder` before the application is built,
//!   then frozen behind an `Arc` and shared read-only by every request.
//! - **Per-request**: created empty for each request and filled by components
//!   while they are constructed. It is frozen into the `RequestContext` before
//!   the first post-construction event fires, so listeners registered for one
//!   request can never be seen by another.
//!
//! `RequestContext::fire` runs the per-request listeners first, then the global
//! ones, and concatenates their return values.
//!
//! ## Lifecycle
//!
//! The dispatcher fires these names once per request, in this order:
//!
//! ```text
//! before_build_components
//! after_build_components
//! before_startup
//! after_startup
//! is_authorized
//! before_dispatch
//!   (action runs)
//! after_dispatch
//! before_render      (only if a view renders)
//! after_render       (only if a view renders)
//! dispatch_complete
//! ```
//!
//! Firing a name nobody listens to is a no-op. A listener that returns `Err`
//! stops the broadcast and the error reaches the caller of `fire`. During
//! `is_authorized` that error rejects the request with a 403.
//!
//! ## Example
//!
//! ```rust
//! use waypost::events::{EventBus, Payload};
//!
//! let mut bus: EventBus<Vec<&'static str>> = EventBus::new();
//! bus.on("ping", |log, _payload| {
//!     log.push("pong");
//!     Ok(None)
//! });
//!
//! let mut log = Vec::new();
//! bus.fire("ping", &mut log, &mut Payload::None).unwrap();
//! bus.fire("nobody-listens", &mut log, &mut Payload::None).unwrap();
//! assert_eq!(log, vec!["pong"]);
//! ```

mod core;

pub use core::{
    EventBus, EventError, Listener, ListenerId, Payload, AFTER_BUILD_COMPONENTS, AFTER_DISPATCH,
    AFTER_RENDER, AFTER_STARTUP, BEFORE_BUILD_COMPONENTS, BEFORE_DISPATCH, BEFORE_RENDER,
    BEFORE_STARTUP, DISPATCH_COMPLETE, IS_AUTHORIZED, LIFECYCLE, SCAFFOLD_AFTER_DELETE,
    SCAFFOLD_AFTER_SAVE, SCAFFOLD_BEFORE_DELETE, SCAFFOLD_BEFORE_SAVE, TEMPLATE_NAMES,
};
