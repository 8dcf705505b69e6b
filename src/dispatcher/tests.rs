use std::sync::Arc;

use http::Method;
use serde_json::{json, Value};

use super::*;
use crate::config::AppConfig;
use crate::controller::{ActionSpec, Args, ControllerDescriptor, RequestContext, RouteOptions};
use crate::error::{ConfigurationError, DispatchError};
use crate::responses::Reply;
use crate::scaffold::{string_template, MemoryStore};
use crate::server::Request;
use crate::view::TemplateEngine;

fn ok(_: &mut RequestContext, _: &Args) -> Result<Reply, DispatchError> {
    Ok(Reply::Text("ok".into()))
}

fn builder() -> AppBuilder {
    AppBuilder::new().config(AppConfig::default())
}

#[test]
fn test_build_indexes_routes_and_controllers() {
    let widgets = ControllerDescriptor::builder("Widgets")
        .handler("list", ok)
        .handler("view", ok)
        .build()
        .unwrap();
    let app = builder().controller(widgets).build().unwrap();
    assert_eq!(app.router().len(), 2);
    assert!(app.router().contains("widgets-list"));
    assert!(app.controller("widgets").is_some());
    assert_eq!(app.controllers().len(), 1);
}

#[test]
fn test_duplicate_route_name_is_rejected() {
    let a = ControllerDescriptor::builder("Widgets").handler("list", ok).build().unwrap();
    let b = ControllerDescriptor::builder("Other")
        .name("widgets")
        .handler("list", ok)
        .build()
        .unwrap();
    let err = builder().controller(a).controller(b).build().unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DuplicateRouteName {
            name: "widgets-list".into()
        }
    );
}

#[test]
fn test_unknown_parser_is_rejected() {
    let desc = ControllerDescriptor::builder("Widgets")
        .parser("Yaml")
        .handler("list", ok)
        .build()
        .unwrap();
    let err = builder().controller(desc).build().unwrap_err();
    assert_eq!(err, ConfigurationError::UnknownParser { name: "Yaml".into() });
}

#[test]
fn test_scaffold_without_model_is_rejected() {
    let desc = ControllerDescriptor::builder("Widgets")
        .scaffold(&["list"])
        .build()
        .unwrap();
    let err = builder().controller(desc).build().unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::MissingModel {
            controller: "Widgets".into()
        }
    );
}

#[test]
fn test_conflicting_custom_templates_are_rejected() {
    let desc = ControllerDescriptor::builder("Widgets")
        .action(
            ActionSpec::new("a", ok)
                .route_with(RouteOptions::new().template("/same").methods(&[Method::GET])),
        )
        .action(
            ActionSpec::new("b", ok)
                .route_with(RouteOptions::new().template("/same").methods(&[Method::GET, Method::POST])),
        )
        .build()
        .unwrap();
    let err = builder().controller(desc).build().unwrap_err();
    assert!(matches!(err, ConfigurationError::ConflictingRoute { .. }));
}

/// Renders the template variables as JSON.
struct VarsEngine;

impl TemplateEngine for VarsEngine {
    fn render(&self, _names: &[String], context: &Value) -> Result<String, DispatchError> {
        Ok(context.to_string())
    }
}

#[test]
fn test_autoadmin_links_on_admin_pages() {
    let store = Arc::new(MemoryStore::new("Widget", string_template(&["name"])));
    let widgets = ControllerDescriptor::builder("Widgets")
        .prefix("admin")
        .model(store)
        .scaffold(&["list", "admin_list"])
        .build()
        .unwrap();
    let pages = ControllerDescriptor::builder("Pages").handler("list", ok).build().unwrap();
    let app = builder()
        .controller(widgets)
        .controller(pages)
        .templates(Arc::new(VarsEngine))
        .autoadmin(true)
        .build()
        .unwrap();

    let admin = Request::get("/admin/widgets")
        .with_header("x-user-email", "root@example.com")
        .with_header("x-user-admin", "true");
    let response = app.dispatch(admin);
    assert_eq!(response.status, 200);
    let vars: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(
        vars["autoadmin"]["links"],
        json!([{"title": "Widgets", "uri": "/admin/widgets"}])
    );

    let response = app.dispatch(Request::get("/widgets"));
    let vars: Value = serde_json::from_slice(&response.body).unwrap();
    assert!(vars.get("autoadmin").is_none());
}

#[test]
fn test_unmatched_request_is_404() {
    let app = builder().build().unwrap();
    let response = app.dispatch(Request::get("/nowhere"));
    assert_eq!(response.status, 404);

    let response = app.dispatch(Request::get("/nowhere").with_header("accept", "application/json"));
    assert_eq!(response.status, 404);
    assert!(response.content_type().unwrap().starts_with("application/json"));
}
