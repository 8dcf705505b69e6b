use std::io;
use std::sync::Arc;

use http::Method;
use may_minihttp::HttpService;
use serde_json::json;
use tracing::warn;

use super::request::parse_request;
use super::response::{write_response, HeaderLines, Response};
use crate::dispatcher::Dispatcher;

/// `may_minihttp` service that feeds every request to a [`Dispatcher`].
///
/// The server clones the service once per connection. A clone shares the
/// dispatcher and starts with empty header storage.
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
    lines: HeaderLines,
}

impl AppService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            lines: HeaderLines::default(),
        }
    }
}

impl Clone for AppService {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.dispatcher))
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint() -> Response {
    Response::json(200, &json!({ "status": "ok" }))
}

impl HttpService for AppService {
    fn call(&mut self, req: may_minihttp::Request, res: &mut may_minihttp::Response) -> io::Result<()> {
        let request = match parse_request(req) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "Rejected request with invalid method");
                let response = Response::text(405, "Method Not Allowed");
                write_response(res, response, &mut self.lines, false);
                return Ok(());
            }
        };

        let head = request.method == Method::HEAD;
        let response = if request.path == "/health"
            && (request.method == Method::GET || head)
        {
            health_endpoint()
        } else {
            self.dispatcher.dispatch(request)
        };
        write_response(res, response, &mut self.lines, head);
        Ok(())
    }
}
