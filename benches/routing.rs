use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use waypost::config::AppConfig;
use waypost::controller::{ActionSpec, Args, ControllerDescriptor, RequestContext};
use waypost::error::DispatchError;
use waypost::responses::Reply;
use waypost::server::Request;
use waypost::{AppBuilder, Dispatcher};

fn text(_ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
    Ok(Reply::Text("ok".into()))
}

/// Fifty controllers with the full CRUD set and one explicit route each.
fn app() -> Dispatcher {
    let mut builder = AppBuilder::new().config(AppConfig::default());
    for i in 0..50 {
        let descriptor = ControllerDescriptor::builder(format!("Resource{i}"))
            .handler("list", text)
            .handler("view", text)
            .handler("add", text)
            .handler("edit", text)
            .handler("delete", text)
            .action(
                ActionSpec::new("report", text)
                    .param("year")
                    .param_default("month", 1)
                    .route(),
            )
            .build()
            .expect("descriptor");
        builder = builder.controller(descriptor);
    }
    builder.build().expect("application")
}

fn bench_match(c: &mut Criterion) {
    let app = app();
    let router = app.router();
    c.bench_function("match_static", |b| {
        b.iter(|| router.match_route(black_box(&Method::GET), black_box("/resource25")))
    });
    c.bench_function("match_param", |b| {
        b.iter(|| router.match_route(black_box(&Method::GET), black_box("/resource49/123/edit")))
    });
    c.bench_function("match_default_variant", |b| {
        b.iter(|| router.match_route(black_box(&Method::GET), black_box("/resource7/report/2024")))
    });
    c.bench_function("match_miss", |b| {
        b.iter(|| router.match_route(black_box(&Method::GET), black_box("/nothing/here")))
    });
}

fn bench_build(c: &mut Criterion) {
    let app = app();
    let router = app.router();
    c.bench_function("build_uri", |b| {
        b.iter(|| router.build(black_box("resource3-view"), black_box(&[("id", "42")])))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let app = app();
    c.bench_function("dispatch_text", |b| {
        b.iter(|| app.dispatch(black_box(Request::get("/resource12/9"))))
    });
}

criterion_group!(benches, bench_match, bench_build, bench_dispatch);
criterion_main!(benches);
