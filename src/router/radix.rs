//! Radix tree used by [`super::Router`] for path matching.
//!
//! Each node is one path segment. Static children are tried before parameter
//! children, and a failed parameter branch is backtracked so a later sibling
//! can still match. Terminal nodes hold every route registered for that exact
//! template shape; the first one answering the request method wins, and a
//! `HEAD` request falls back to the first route answering `GET`.
//!
//! Request paths are split on `/` first and each segment is then
//! percent-decoded, so `%2F` inside a parameter never splits it.

use http::Method;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::sync::Arc;

use super::core::{ParamVec, Route, RouteMatch};

#[derive(Debug, Clone, Default)]
struct RadixNode {
    segment: String,
    /// `Some` for `{param}` nodes.
    param_name: Option<Arc<str>>,
    routes: Vec<Arc<Route>>,
    children: Vec<RadixNode>,
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Self::default()
        }
    }

    fn new_param(name: &str) -> Self {
        Self {
            param_name: Some(Arc::from(name)),
            ..Self::default()
        }
    }

    fn insert(&mut self, segments: &[&str], route: Arc<Route>) {
        let Some((segment, remaining)) = segments.split_first() else {
            self.routes.push(route);
            return;
        };

        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(name))
            {
                child.insert(remaining, route);
                return;
            }
            let mut child = RadixNode::new_param(name);
            child.insert(remaining, route);
            self.param_children.push(child);
            return;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *segment) {
            child.insert(remaining, route);
            return;
        }
        let mut child = RadixNode::new(segment);
        child.insert(remaining, route);
        self.children.push(child);
    }

    fn search(&self, segments: &[&str], method: &Method, params: &mut ParamVec) -> Option<Arc<Route>> {
        let Some((segment, remaining)) = segments.split_first() else {
            let exact = self.routes.iter().find(|r| r.answers(method));
            // HEAD is served by the GET route when no route lists HEAD itself.
            let head_via_get = || {
                (*method == Method::HEAD)
                    .then(|| self.routes.iter().find(|r| r.answers(&Method::GET)))
                    .flatten()
            };
            return exact.or_else(head_via_get).cloned();
        };

        for child in &self.children {
            if child.segment == *segment {
                if let Some(route) = child.search(remaining, method, params) {
                    return Some(route);
                }
            }
        }

        for child in &self.param_children {
            if let Some(name) = &child.param_name {
                params.push((Arc::clone(name), (*segment).to_string()));
                if let Some(route) = child.search(remaining, method, params) {
                    return Some(route);
                }
                params.pop();
            }
        }

        None
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RadixTree {
    root: RadixNode,
}

impl RadixTree {
    pub(crate) fn insert(&mut self, template: &str, route: Arc<Route>) {
        let segments = split_path(template);
        self.root.insert(&segments, route);
    }

    pub(crate) fn search(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let decoded: Vec<Cow<'_, str>> = split_path(path)
            .into_iter()
            .map(|s| percent_decode_str(s).decode_utf8_lossy())
            .collect();
        let segments: Vec<&str> = decoded.iter().map(|s| &**s).collect();
        let mut params = ParamVec::new();
        self.root
            .search(&segments, method, &mut params)
            .map(|route| RouteMatch {
                route,
                path_params: params,
            })
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
