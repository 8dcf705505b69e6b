use std::borrow::Cow;
use std::io::Read;
use std::sync::Arc;

use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

use crate::ids::RequestId;
use crate::router::ParamVec;

/// Headers and cookies as `(name, value)` pairs; names are stored lowercase.
///
/// Sized for typical proxy traffic so most requests never spill to the heap.
pub type HeaderVec = SmallVec<[(Arc<str>, String); 16]>;

/// Owned inbound request handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request from a method and a target such as `/widgets?alt=json`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            request_id: RequestId::new(),
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query_params: parse_query(query),
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    /// Add a header. A `cookie` header also refreshes the parsed cookies.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            self.cookies = parse_cookies(value);
        }
        self.headers.push((Arc::from(name), value.to_string()));
        self
    }

    pub fn with_body(self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut req = self.with_header("content-type", content_type);
        req.body = body.into();
        req
    }

    /// Attach an `application/x-www-form-urlencoded` body.
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.with_body("application/x-www-form-urlencoded", body)
    }

    pub fn with_json(self, value: &Value) -> Self {
        self.with_body("application/json", value.to_string())
    }

    /// Case-insensitive header lookup; the last occurrence wins.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or(ct)
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct == "application/json" || ct.ends_with("+json"))
    }

    pub fn is_form(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct == "application/x-www-form-urlencoded")
    }

    pub fn accepts_json(&self) -> bool {
        self.header("accept")
            .is_some_and(|accept| accept.trim().eq_ignore_ascii_case("application/json"))
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Query parameters followed by url-encoded form fields, in arrival order.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .query_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        if self.is_form() {
            out.extend(
                url::form_urlencoded::parse(&self.body).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        out
    }

    /// First value of `name` in query or form body.
    pub fn param(&self, name: &str) -> Option<String> {
        self.params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params().iter().any(|(k, _)| k == name)
    }
}

/// Parse a `Cookie` header value into pairs.
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((Arc::from(name), value))
        })
        .collect()
}

/// Decode a raw query string (without `?`).
pub fn parse_query(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

/// Convert a wire request from `may_minihttp` into an owned [`Request`].
pub fn parse_request(req: may_minihttp::Request) -> Result<Request, http::method::InvalidMethod> {
    let method = Method::from_bytes(req.method().as_bytes())?;
    let mut request = Request::new(method, req.path());

    for h in req.headers().iter() {
        let name = h.name.to_ascii_lowercase();
        let value = String::from_utf8_lossy(h.value).to_string();
        if name == "cookie" {
            request.cookies.extend(parse_cookies(&value));
        }
        request.headers.push((Arc::from(name), value));
    }

    if let Some(id) = request.header("x-request-id") {
        request.request_id = RequestId::from_header_or_new(Some(id));
    }

    let mut body = Vec::new();
    if let Ok(size) = req.body().read_to_end(&mut body) {
        if size > 0 {
            request.body = body;
        }
    }

    debug!(
        request_id = %request.request_id,
        method = %request.method,
        path = %request.path,
        header_count = request.headers.len(),
        cookie_count = request.cookies.len(),
        query_count = request.query_params.len(),
        body_bytes = request.body.len(),
        "HTTP request parsed"
    );

    Ok(request)
}
