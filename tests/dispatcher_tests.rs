//! Integration tests for the request lifecycle
//!
//! # Test Coverage
//!
//! - Lifecycle event order, and request listeners firing before global ones
//! - Render events fire twice on auto-render and never for direct replies
//! - Authorization: controller chain, action checks, `is_authorized`,
//!   short-circuiting and redirects
//! - Response strategies for each reply kind, custom type handlers and the
//!   unhandled-result error
//! - Errors rendered through the active view
//! - Startup hooks, component construction failures, listener failures
//! - Auto-render, template name resolution and sessions
//!
//! # Test Strategy
//!
//! Applications are assembled in-process with `AppBuilder` and driven with
//! `Dispatcher::dispatch`; no socket is opened. Templates go through a
//! recording engine so tests can inspect the names and variables a render
//! would have used.

mod common;

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::fixtures::{as_admin, body_json, builder, ok, session_cookie, RecordingEngine};
use serde_json::{json, Value};
use waypost::auth::{self, Authorization, CurrentUser, DEFAULT_DENY_MESSAGE};
use waypost::components::Component;
use waypost::config::AppConfig;
use waypost::controller::{ActionSpec, Args, ControllerDescriptor, RequestContext};
use waypost::error::DispatchError;
use waypost::events::{
    EventBus, EventError, Payload, AFTER_RENDER, BEFORE_DISPATCH, BEFORE_RENDER, DISPATCH_COMPLETE,
    IS_AUTHORIZED, LIFECYCLE,
};
use waypost::responses::{Reply, ReplyKind};
use waypost::server::{Request, Response};
use waypost::view::ViewKind;
use waypost::{AppBuilder, Dispatcher};

fn single(builder: AppBuilder, descriptor: ControllerDescriptor) -> Dispatcher {
    builder.controller(descriptor).build().unwrap()
}

fn render_nothing(_ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
    Ok(Reply::None)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn test_lifecycle_events_fire_in_order() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut app = builder().templates(Arc::new(RecordingEngine::default()));
    for event in LIFECYCLE {
        let log = Arc::clone(&log);
        app = app.on(event, move |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
            log.lock().unwrap().push(event.to_string());
            Ok(None)
        });
    }
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", render_nothing)
        .build()
        .unwrap();
    let app = single(app, pages);

    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "rendered pages/list.html");
    let fired = log.lock().unwrap().clone();
    assert_eq!(fired, LIFECYCLE.iter().map(|e| e.to_string()).collect::<Vec<_>>());
}

/// Appends `local` to `context["order"]` on `before_dispatch`.
struct OrderRecorder;

fn push_order(ctx: &mut RequestContext, who: &str) {
    let mut order = match ctx.context.remove("order") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    order.push(json!(who));
    ctx.context.insert("order", Value::Array(order));
}

impl Component for OrderRecorder {
    fn build(
        _ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        events.on(BEFORE_DISPATCH, |ctx, _payload| {
            push_order(ctx, "local");
            Ok(None)
        });
        Ok(OrderRecorder)
    }
}

#[test]
fn test_request_listeners_fire_before_global() {
    let app = builder().on(BEFORE_DISPATCH, |ctx: &mut RequestContext, _p: &mut Payload<'_>| {
        push_order(ctx, "global");
        Ok(None)
    });
    let pages = ControllerDescriptor::builder("Pages")
        .component::<OrderRecorder>()
        .handler("list", |ctx: &mut RequestContext, _args: &Args| {
            Ok(Reply::Text(ctx.context.get("order").cloned().unwrap_or_default().to_string()))
        })
        .build()
        .unwrap();
    let app = single(app, pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.body_text(), r#"["local","global"]"#);
}

#[test]
fn test_component_listeners_are_per_request() {
    let pages = ControllerDescriptor::builder("Pages")
        .component::<OrderRecorder>()
        .handler("list", |ctx: &mut RequestContext, _args: &Args| {
            Ok(Reply::Text(ctx.context.get("order").cloned().unwrap_or_default().to_string()))
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);
    for _ in 0..3 {
        let response = app.dispatch(Request::get("/pages"));
        assert_eq!(response.body_text(), r#"["local"]"#);
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[test]
fn test_authorization_chain_short_circuits() {
    let later_checks = Arc::new(AtomicUsize::new(0));
    let actions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&later_checks);
    let invoked = Arc::clone(&actions);
    let pages = ControllerDescriptor::builder("Pages")
        .authorize(auth::check(|_ctx| (false, "nope")))
        .authorize(auth::check(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }))
        .handler("list", move |_ctx: &mut RequestContext, _args: &Args| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::Text("secret".into()))
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);

    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 403);
    assert_eq!(response.body_text(), "nope");
    assert_eq!(later_checks.load(Ordering::SeqCst), 0);
    assert_eq!(actions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_denial_without_message_uses_default() {
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", ok)
        .action(
            ActionSpec::new("secret", ok)
                .authorize(auth::check(|ctx| ctx.request.header("x-token").is_some()))
                .route(),
        )
        .build()
        .unwrap();
    let app = single(builder(), pages);

    assert_eq!(app.dispatch(Request::get("/pages")).status, 200);
    let denied = app.dispatch(Request::get("/pages/secret"));
    assert_eq!(denied.status, 403);
    assert_eq!(denied.body_text(), DEFAULT_DENY_MESSAGE);
    let allowed = app.dispatch(Request::get("/pages/secret").with_header("x-token", "t"));
    assert_eq!(allowed.status, 200);
}

#[test]
fn test_denial_renders_json_under_json_view() {
    let pages = ControllerDescriptor::builder("Pages")
        .view(ViewKind::Json)
        .authorize(auth::require_user())
        .handler("list", ok)
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 403);
    assert_eq!(
        body_json(&response),
        json!({"error": "Login required", "status": 403})
    );
}

#[test]
fn test_is_authorized_false_rejects() {
    let app = builder().on(IS_AUTHORIZED, |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
        Ok(Some(Value::Bool(false)))
    });
    let pages = ControllerDescriptor::builder("Pages").handler("list", ok).build().unwrap();
    let app = single(app, pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 403);
    assert_eq!(response.body_text(), DEFAULT_DENY_MESSAGE);
}

#[test]
fn test_is_authorized_rejection_message_is_the_body() {
    let app = builder().on(IS_AUTHORIZED, |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
        Err(EventError::Rejected("closed for maintenance".into()))
    });
    let pages = ControllerDescriptor::builder("Pages").handler("list", ok).build().unwrap();
    let app = single(app, pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 403);
    assert_eq!(response.body_text(), "closed for maintenance");
}

#[test]
fn test_authorization_redirect() {
    let pages = ControllerDescriptor::builder("Pages")
        .authorize(auth::check(|ctx| match ctx.user {
            Some(_) => Authorization::Allow,
            None => Authorization::Redirect("/login".into()),
        }))
        .handler("list", ok)
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/login"));

    let response = app.dispatch(Request::get("/pages").with_header("x-user-email", "a@b.io"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_startup_hook_runs_before_authorization() {
    let pages = ControllerDescriptor::builder("Pages")
        .startup(|ctx| {
            ctx.user = Some(CurrentUser::new("hook@example.com"));
            Ok(())
        })
        .authorize(auth::require_user())
        .handler("list", |ctx: &mut RequestContext, _args: &Args| {
            Ok(Reply::Text(ctx.user.as_ref().map(|u| u.email.clone()).unwrap_or_default()))
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "hook@example.com");
}

// ---------------------------------------------------------------------------
// Response strategies
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Receipt(u32);

type Handler = fn(&mut RequestContext, &Args) -> Result<Reply, DispatchError>;

fn routed(name: &str, handler: Handler) -> ActionSpec {
    ActionSpec::new(name, handler).route()
}

fn replies_app(builder: AppBuilder) -> Dispatcher {
    let replies = ControllerDescriptor::builder("Replies")
        .action(routed("text", |_, _| Ok(Reply::Text("hi".into()))))
        .action(routed("status", |_, _| Ok(Reply::Status(204))))
        .action(routed("missing", |_, _| Ok(Reply::Status(404))))
        .action(routed("raw", |_, _| {
            Ok(Reply::from((
                201u16,
                vec![("x-id".to_string(), "42".to_string())],
                "made".to_string(),
            )))
        }))
        .action(routed("response", |_, _| {
            Ok(Reply::Response(Response::json(202, &json!({"queued": true}))))
        }))
        .action(routed("message", |_, _| Reply::message(&json!({"a": 1}))))
        .action(routed("other", |_, _| Ok(Reply::other(Receipt(9)))))
        .build()
        .unwrap();
    single(builder, replies)
}

#[test]
fn test_default_response_strategies() {
    let app = replies_app(builder());

    let text = app.dispatch(Request::get("/replies/text"));
    assert_eq!(text.status, 200);
    assert_eq!(text.body_text(), "hi");
    assert!(text.content_type().unwrap().starts_with("text/plain"));

    let status = app.dispatch(Request::get("/replies/status"));
    assert_eq!(status.status, 204);
    assert!(status.body.is_empty());

    let raw = app.dispatch(Request::get("/replies/raw"));
    assert_eq!(raw.status, 201);
    assert_eq!(raw.header("x-id"), Some("42"));
    assert_eq!(raw.body_text(), "made");

    let passed = app.dispatch(Request::get("/replies/response"));
    assert_eq!(passed.status, 202);
    assert_eq!(body_json(&passed), json!({"queued": true}));

    let message = app.dispatch(Request::get("/replies/message"));
    assert_eq!(message.status, 200);
    assert!(message.content_type().unwrap().starts_with("application/json"));
    assert_eq!(body_json(&message), json!({"a": 1}));
}

#[test]
fn test_response_dispatch_table() {
    let app = replies_app(builder());

    let text = app.dispatch(Request::get("/replies/text"));
    assert_eq!(text.status, 200);
    assert_eq!(text.body_text(), "hi");

    let missing = app.dispatch(Request::get("/replies/missing"));
    assert_eq!(missing.status, 404);
    assert!(missing.body.is_empty());

    let passed = app.dispatch(Request::get("/replies/response"));
    let expected = Response::json(202, &json!({"queued": true}));
    assert_eq!(passed.status, expected.status);
    assert_eq!(passed.body, expected.body);
    assert_eq!(passed.content_type(), expected.content_type());
}

/// Counts `before_render` and `after_render` per request.
fn render_counting(builder: AppBuilder) -> (AppBuilder, Arc<Mutex<Vec<&'static str>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut builder = builder.templates(Arc::new(RecordingEngine::default()));
    for event in [BEFORE_RENDER, AFTER_RENDER] {
        let fired = Arc::clone(&fired);
        builder = builder.on(event, move |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
            fired.lock().unwrap().push(event);
            Ok(None)
        });
    }
    (builder, fired)
}

#[test]
fn test_render_events_skipped_for_direct_replies() {
    let (builder, fired) = render_counting(builder());
    let app = replies_app(builder);
    for path in ["/replies/text", "/replies/status", "/replies/missing", "/replies/response"] {
        let response = app.dispatch(Request::get(path));
        assert!(response.status < 500, "{path} -> {}", response.status);
        assert!(fired.lock().unwrap().is_empty(), "{path} fired render events");
    }
}

#[test]
fn test_render_events_fire_once_each_when_auto_rendering() {
    let (builder, fired) = render_counting(builder());
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", render_nothing)
        .build()
        .unwrap();
    let app = single(builder, pages);

    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 200);
    assert_eq!(*fired.lock().unwrap(), vec![BEFORE_RENDER, AFTER_RENDER]);
}

#[test]
fn test_unhandled_result_is_500() {
    let app = replies_app(builder());
    let response = app.dispatch(Request::get("/replies/other"));
    assert_eq!(response.status, 500);
    assert!(response
        .body_text()
        .contains("Nothing was able to handle the response Receipt(9)"));
}

#[test]
fn test_registered_type_handler() {
    let handler = Arc::new(
        |_ctx: &mut RequestContext, reply: Reply| -> Result<Response, DispatchError> {
            match reply {
                Reply::Other(other) => match other.downcast::<Receipt>() {
                    Ok(receipt) => Ok(Response::text(200, format!("receipt #{}", receipt.0))),
                    Err(other) => Err(DispatchError::Internal(other.type_name().to_string())),
                },
                _ => Err(DispatchError::Internal("not a receipt".into())),
            }
        },
    );
    let app = replies_app(builder().responder(ReplyKind::Other(TypeId::of::<Receipt>()), handler));
    let response = app.dispatch(Request::get("/replies/other"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "receipt #9");
}

#[test]
fn test_opaque_handler_catches_every_other_type() {
    let handler = Arc::new(
        |_ctx: &mut RequestContext, reply: Reply| -> Result<Response, DispatchError> {
            Ok(Response::text(200, reply.describe()))
        },
    );
    let app = replies_app(builder().responder(ReplyKind::Opaque, handler));
    let response = app.dispatch(Request::get("/replies/other"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "Receipt(9)");
}

#[test]
fn test_body_clears_pending_redirect() {
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", |ctx: &mut RequestContext, _args: &Args| {
            ctx.response.status = 302;
            ctx.response.set_header("location", "/elsewhere");
            Ok(Reply::Text("stay".into()))
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 200);
    assert!(response.header("location").is_none());
    assert_eq!(response.body_text(), "stay");
}

#[test]
fn test_action_redirect_passes_through() {
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", |ctx: &mut RequestContext, _args: &Args| Ok(ctx.redirect("/next")))
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/next"));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

fn missing(_ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
    Err(DispatchError::NotFound(Some("no such page".into())))
}

#[test]
fn test_action_error_renders_through_view() {
    let html = ControllerDescriptor::builder("Pages").handler("view", missing).build().unwrap();
    let app = single(builder(), html);
    let response = app.dispatch(Request::get("/pages/3"));
    assert_eq!(response.status, 404);
    assert_eq!(response.body_text(), "no such page");

    let api = ControllerDescriptor::builder("Pages")
        .view(ViewKind::Json)
        .handler("view", missing)
        .build()
        .unwrap();
    let app = single(builder(), api);
    let response = app.dispatch(Request::get("/pages/3"));
    assert_eq!(response.status, 404);
    assert_eq!(
        body_json(&response),
        json!({"error": "no such page", "status": 404})
    );
}

struct Broken;

impl Component for Broken {
    fn build(
        _ctx: &mut RequestContext,
        _events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError> {
        Err(DispatchError::Internal("database unavailable".into()))
    }
}

#[test]
fn test_component_construction_failure_is_500() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let pages = ControllerDescriptor::builder("Pages")
        .component::<Broken>()
        .handler("list", move |_ctx: &mut RequestContext, _args: &Args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::None)
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 500);
    assert!(response.body_text().contains("component 'broken' failed to build"));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[test]
fn test_listener_failure_is_500_and_still_completes() {
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    let app = builder()
        .on(BEFORE_DISPATCH, |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
            Err(EventError::Failed("audit log full".into()))
        })
        .on(DISPATCH_COMPLETE, move |_ctx: &mut RequestContext, _p: &mut Payload<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
    let pages = ControllerDescriptor::builder("Pages").handler("list", ok).build().unwrap();
    let app = single(app, pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 500);
    assert!(response.body_text().contains("audit log full"));
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatch_complete_sees_rejected_requests() {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&statuses);
    let app = builder().on(
        DISPATCH_COMPLETE,
        move |ctx: &mut RequestContext, _p: &mut Payload<'_>| {
            seen.lock().unwrap().push(ctx.response.status);
            Ok(None)
        },
    );
    let pages = ControllerDescriptor::builder("Pages")
        .authorize(auth::require_user())
        .handler("list", ok)
        .build()
        .unwrap();
    let app = single(app, pages);
    app.dispatch(Request::get("/pages"));
    assert_eq!(*statuses.lock().unwrap(), vec![403]);
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[test]
fn test_none_without_auto_render_is_unhandled() {
    let pages = ControllerDescriptor::builder("Pages")
        .auto_render(false)
        .handler("list", render_nothing)
        .handler("view", |ctx: &mut RequestContext, _args: &Args| {
            ctx.response.set_text("written directly");
            Ok(Reply::None)
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);
    let response = app.dispatch(Request::get("/pages"));
    assert_eq!(response.status, 500);
    assert!(response.body_text().contains("Nothing was able to handle the response None"));

    let response = app.dispatch(Request::get("/pages/1"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "written directly");
}

#[test]
fn test_template_names_for_themed_admin_route() {
    let engine = Arc::new(RecordingEngine::default());
    let mut config = AppConfig::default();
    config.templates.theme = Some("dark".into());
    let pages = ControllerDescriptor::builder("Pages")
        .prefix("admin")
        .handler("admin_list", |ctx: &mut RequestContext, _args: &Args| {
            ctx.context.set("title", "Dashboard")?;
            Ok(Reply::None)
        })
        .build()
        .unwrap();
    let app = AppBuilder::new()
        .config(config)
        .templates(Arc::clone(&engine) as Arc<dyn waypost::view::TemplateEngine>)
        .controller(pages)
        .build()
        .unwrap();

    let response = app.dispatch(as_admin(Request::get("/admin/pages")));
    assert_eq!(response.status, 200);
    assert!(response.content_type().unwrap().starts_with("text/html"));
    let (names, vars) = engine.last();
    assert_eq!(
        names,
        vec![
            "themes/dark/pages/admin_list.html",
            "themes/dark/pages/list.html",
            "pages/admin_list.html",
            "pages/list.html",
        ]
    );
    assert_eq!(vars["title"], json!("Dashboard"));
    assert_eq!(vars["route"]["action"], json!("list"));
    assert_eq!(vars["route"]["prefix"], json!("admin"));
    assert_eq!(vars["user"], json!("root@example.com"));
}

#[test]
fn test_session_survives_between_requests() {
    let pages = ControllerDescriptor::builder("Pages")
        .handler("list", |ctx: &mut RequestContext, _args: &Args| {
            let visits = ctx.session.get("visits").and_then(Value::as_u64).unwrap_or(0) + 1;
            ctx.session.set("visits", json!(visits));
            Ok(Reply::Text(visits.to_string()))
        })
        .build()
        .unwrap();
    let app = single(builder(), pages);

    let first = app.dispatch(Request::get("/pages"));
    assert_eq!(first.body_text(), "1");
    let cookie = session_cookie(&first);
    assert!(cookie.starts_with("waypost_session="));

    let second = app.dispatch(Request::get("/pages").with_header("cookie", &cookie));
    assert_eq!(second.body_text(), "2");
    assert!(second.header("set-cookie").is_none());

    // a request without the cookie starts over
    let fresh = app.dispatch(Request::get("/pages"));
    assert_eq!(fresh.body_text(), "1");
}
