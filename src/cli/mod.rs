//! # CLI Module
//!
//! The `waypost` binary serves a demo application and prints its route table.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! waypost serve --config waypost.yaml --addr 127.0.0.1:8080
//! ```
//!
//! Loads the YAML configuration (defaults when `--config` is omitted), applies
//! `WAYPOST_*` overrides, initialises logging and serves until SIGINT/SIGTERM.
//!
//! ### `routes`
//!
//! ```bash
//! waypost routes
//! ```
//!
//! One line per route: name, methods, templates.
//!
//! ## Demo Application
//!
//! A `widgets` controller scaffolded over an in-memory store, with an `admin`
//! prefix and the JSON, pagination and flash components. Append `?alt=json`
//! or send `Accept: application/json` to get JSON instead of HTML.

mod commands;
mod demo;


pub use commands::{route_table, run, run_cli, Cli, Commands};
pub use demo::{demo_app, widget_store};
