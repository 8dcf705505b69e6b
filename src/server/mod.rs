//! HTTP types and the `may_minihttp` adapter.
//!
//! [`Request`] and [`Response`] are the framework's own owned types; nothing
//! past [`AppService`] sees the wire representation.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, HeaderVec, Request};
pub use response::{status_reason, Response};
pub use service::{health_endpoint, AppService};
