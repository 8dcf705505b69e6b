use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use super::request::HeaderVec;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// Response under construction and, once dispatch finishes, the final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut res = Self::new(status);
        res.set_body(TEXT_PLAIN, body.into().into_bytes());
        res
    }

    pub fn json(status: u16, body: &Value) -> Self {
        let mut res = Self::new(status);
        res.set_json(body);
        res
    }

    /// A redirect response with a `Location` header.
    pub fn redirect(location: &str, status: u16) -> Self {
        let mut res = Self::new(status);
        res.set_header("location", location);
        res
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.to_string()));
    }

    /// Add a header without replacing existing ones (`set-cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.headers.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn set_body(&mut self, content_type: &str, body: Vec<u8>) {
        self.set_header("content-type", content_type);
        self.body = body;
    }

    pub fn set_text(&mut self, body: impl Into<String>) {
        self.set_body(TEXT_PLAIN, body.into().into_bytes());
    }

    pub fn set_json(&mut self, body: &Value) {
        self.set_body(APPLICATION_JSON, body.to_string().into_bytes());
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 300 | 301 | 302 | 303 | 307 | 308)
    }

    /// Turn a pending redirect into a plain 200 and drop its `Location`.
    ///
    /// Called whenever a later stage writes a body, so a response never
    /// carries both a redirect status and content.
    pub fn clear_redirect(&mut self) {
        if self.is_redirect() {
            self.status = 200;
            self.remove_header("location");
        }
    }
}

/// Reason phrase for the status line.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Owned storage for the header lines of the response being written.
///
/// `may_minihttp` takes header lines as `&'static str`. The stock content
/// types are real statics; every other line is held here until the next
/// [`HeaderLines::render`] on the same connection. Each connection owns its
/// own `HeaderLines` (see [`super::AppService`]) and its loop encodes a
/// response before it reads the next request, so a held line outlives every
/// response that refers to it.
#[derive(Debug, Default)]
pub(crate) struct HeaderLines {
    held: Vec<Arc<str>>,
}

impl HeaderLines {
    /// Release the previous response's lines and format `response`'s headers.
    pub(crate) fn render(&mut self, response: &Response) -> SmallVec<[&'static str; 8]> {
        self.held.clear();
        let mut lines = SmallVec::new();
        for (name, value) in &response.headers {
            let line = match (name.as_ref(), value.as_str()) {
                ("content-type", TEXT_PLAIN) => "Content-Type: text/plain; charset=utf-8",
                ("content-type", TEXT_HTML) => "Content-Type: text/html; charset=utf-8",
                ("content-type", APPLICATION_JSON) => "Content-Type: application/json; charset=utf-8",
                _ => self.hold(format!("{name}: {value}")),
            };
            lines.push(line);
        }
        lines
    }

    /// Lines currently held for the last rendered response.
    pub(crate) fn held(&self) -> usize {
        self.held.len()
    }

    fn hold(&mut self, line: String) -> &'static str {
        let line: Arc<str> = Arc::from(line);
        // SAFETY: the `Arc` keeps the allocation alive and unmoved until the
        // next `render` clears `held`, which only happens after the response
        // referring to it has been encoded (see the type docs).
        let view: &'static str = unsafe { &*Arc::as_ptr(&line) };
        self.held.push(line);
        view
    }
}

/// Write a finished [`Response`] onto the `may_minihttp` response.
///
/// `HEAD` responses keep their status and headers but drop the body.
pub(crate) fn write_response(
    res: &mut may_minihttp::Response,
    response: Response,
    lines: &mut HeaderLines,
    head: bool,
) {
    res.status_code(response.status as usize, status_reason(response.status));
    for line in lines.render(&response) {
        res.header(line);
    }
    if !head {
        res.body_vec(response.body);
    }
}
