//! # waypost
//!
//! **waypost** is a convention-driven controller framework for the `may`
//! coroutine runtime. Controllers are declared once as immutable descriptors;
//! routes, CRUD handlers and admin navigation are derived from them.
//!
//! ## Overview
//!
//! - **[`router`]** derives conventional CRUD routes and explicit routes (with
//!   shorter variants for defaulted parameters) and matches requests in a radix tree
//! - **[`controller`]** holds the descriptor model and the per-request context
//! - **[`components`]** are per-request plugins that subscribe to lifecycle events
//! - **[`events`]** is the ordered, name-keyed listener bus used globally and per request
//! - **[`auth`]** evaluates short-circuiting authorization chains
//! - **[`parsers`]** turn request bodies into typed values with field errors
//! - **[`responses`]** map action return values to HTTP responses by kind
//! - **[`view`]** renders templates (minijinja) or JSON
//! - **[`scaffold`]** provides generic list/view/add/edit/delete over a [`scaffold::Store`]
//! - **[`dispatcher`]** assembles everything and runs the request state machine
//! - **[`server`]** adapts the dispatcher to `may_minihttp`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use waypost::components::Json;
//! use waypost::controller::ControllerDescriptor;
//! use waypost::dispatcher::AppBuilder;
//! use waypost::scaffold::{string_template, MemoryStore};
//! use waypost::server::Request;
//!
//! let store = Arc::new(MemoryStore::new("Widget", string_template(&["name"])));
//! let widgets = ControllerDescriptor::builder("Widgets")
//!     .model(store)
//!     .component::<Json>()
//!     .scaffold(&["list", "view", "add", "edit", "delete"])
//!     .build()
//!     .unwrap();
//! let app = AppBuilder::new().controller(widgets).build().unwrap();
//!
//! let created = app.dispatch(
//!     Request::post("/widgets?alt=json").with_form(&[("name", "Sprocket")]),
//! );
//! assert_eq!(created.status, 200);
//! let listed = app.dispatch(Request::get("/widgets?alt=json"));
//! assert!(listed.body_text().contains("Sprocket"));
//! ```
//!
//! ## Request Lifecycle
//!
//! ```text
//! resolve -> construct components -> startup -> authorize -> act
//!         -> resolve response -> finalize
//! ```
//!
//! Every stage fires lifecycle events; see [`events`] for the names and
//! [`dispatcher`] for the details of each stage.

pub mod auth;
pub mod cli;
pub mod components;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ids;
pub mod inflector;
pub mod logging;
pub mod parsers;
pub mod responses;
pub mod router;
pub mod scaffold;
pub mod server;
pub mod session;
pub mod view;

pub use dispatcher::{AppBuilder, Dispatcher};
pub use error::{ConfigurationError, DispatchError};
