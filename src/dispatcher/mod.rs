//! # Dispatcher Module
//!
//! Assembles controllers into an application and runs every request through a
//! fixed sequence of stages.
//!
//! ## Building
//!
//! [`AppBuilder`] collects controller descriptors, global listeners, request
//! parsers and response handlers, then freezes them into a [`Dispatcher`].
//! Route derivation and validation happen in [`AppBuilder::build`]; a bad
//! declaration is a [`ConfigurationError`](crate::error::ConfigurationError)
//! at startup, never a per-request failure.
//!
//! ```rust
//! use waypost::controller::ControllerDescriptor;
//! use waypost::dispatcher::AppBuilder;
//! use waypost::server::Request;
//!
//! let hello = ControllerDescriptor::builder("Hello")
//!     .handler("list", |_ctx, _args| Ok("hello".into()))
//!     .build()
//!     .unwrap();
//! let app = AppBuilder::new().controller(hello).build().unwrap();
//! let response = app.dispatch(Request::get("/hello"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body_text(), "hello");
//! ```
//!
//! ## Request Lifecycle
//!
//! 1. **Resolve**: match the route; no match is a 404
//! 2. **Construct**: `before_build_components`, build each declared component
//!    in order, freeze the request bus, `after_build_components`
//! 3. **Startup**: `before_startup`, the controller's startup hook, `after_startup`
//! 4. **Authorize**: controller chain, action checks, `is_authorized`; the
//!    first rejection finalizes the request with a 403 or 302
//! 5. **Act**: `before_dispatch`, the action, `after_dispatch`
//! 6. **Resolve response**: response handler registry, a pre-written body,
//!    auto-render, else a 500 naming the unhandled value
//! 7. **Finalize**: `dispatch_complete`, save the session
//!
//! Failures at any stage render through the active view with the error's
//! status, so JSON controllers answer errors in JSON.

mod builder;
mod core;
#[cfg(test)]
mod tests;

pub use builder::AppBuilder;
pub use core::{Dispatcher, Services};
