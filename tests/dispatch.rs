use std::sync::Arc;
use std::time::Duration;

use waypost::middleware::{self, CorsConfig, RecoveryConfig};
use http_body_util::BodyExt;
use waypost::{BoxFuture, Context, Cookie, Engine, HandlerFn, Method, Request, Response, RouteError, Status, handler_fn};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Appends `name` to the `trace` header.
fn mark(name: &'static str) -> HandlerFn {
    handler_fn(move |ctx| Box::pin(async move {
        let trace = match ctx.response().header("x-trace") {
            Some(prev) => format!("{prev},{name}"),
            None => name.to_owned(),
        };
        ctx.header("x-trace", &trace);
    }))
}

fn echo_params(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let pairs: Vec<String> = ctx.params().iter().map(|(k, v)| format!("{k}={v}")).collect();
        let route = ctx.full_path().unwrap_or("-").to_owned();
        ctx.text(Status::Ok, format!("{route} {}", pairs.join("&")));
    })
}

async fn get(engine: &Engine, target: &str) -> (u16, String, Option<String>) {
    let res = engine.handle(Request::new(Method::Get, target)).await;
    let trace = res.header("x-trace").map(str::to_owned);
    (res.status(), String::from_utf8_lossy(res.body()).into_owned(), trace)
}

async fn body_of(res: Response) -> String {
    let bytes = res.into_http().into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolves_params_and_catch_all() {
    let mut app = Engine::new();
    app.get("/users/:id", [handler_fn(echo_params)]).unwrap()
        .get("/users/:id/posts/:post", [handler_fn(echo_params)]).unwrap()
        .get("/files/*rest", [handler_fn(echo_params)]).unwrap()
        .get("/v:version/info", [handler_fn(echo_params)]).unwrap();

    assert_eq!(get(&app, "/users/42").await.1, "/users/:id id=42");
    assert_eq!(get(&app, "/users/7/posts/9").await.1, "/users/:id/posts/:post id=7&post=9");
    assert_eq!(get(&app, "/files/a/b/c.txt").await.1, "/files/*rest rest=a/b/c.txt");
    assert_eq!(get(&app, "/files/").await.1, "/files/*rest rest=");
    assert_eq!(get(&app, "/v2/info").await.1, "/v:version/info version=2");
    assert_eq!(get(&app, "/users/").await.0, 404);
}

#[tokio::test]
async fn methods_have_separate_trees() {
    let mut app = Engine::new();
    app.post("/items", [mark("post")]).unwrap();

    let res = app.handle(Request::new(Method::Post, "/items")).await;
    assert_eq!(res.header("x-trace"), Some("post"));
    assert_eq!(get(&app, "/items").await.0, 404);
}

#[tokio::test]
async fn any_registers_every_common_method() {
    let mut app = Engine::new();
    app.any("/ping", [mark("any")]).unwrap();
    for method in Method::ANY {
        let res = app.handle(Request::new(method, "/ping")).await;
        assert_eq!(res.header("x-trace"), Some("any"), "{method}");
    }
    let res = app.handle(Request::new(Method::Trace, "/ping")).await;
    assert_eq!(res.status(), 404);
}

#[test]
fn conflicting_registration_is_an_error() {
    let mut app = Engine::new();
    app.get("/users/:id", [mark("a")]).unwrap();
    assert!(matches!(
        app.get("/users/:id", [mark("b")]),
        Err(RouteError::Duplicate { .. })
    ));
    assert!(matches!(
        app.get("/users/new", [mark("c")]),
        Err(RouteError::WildcardConflict { .. })
    ));
}

// ── Groups and chains ─────────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_runs_ancestor_first() {
    let mut app = Engine::new();
    app.use_middleware([mark("root")]);
    {
        let mut api = app.group("/api", [mark("api")]);
        api.use_middleware([mark("api2")]);
        let mut v1 = api.group("v1/", [mark("v1")]);
        assert_eq!(v1.base_path(), "/api/v1/");
        v1.get("/users", [mark("handler")]).unwrap();
    }

    let (status, _, trace) = get(&app, "/api/v1/users").await;
    assert_eq!(status, 200);
    assert_eq!(trace.as_deref(), Some("root,api,api2,v1,handler"));
}

#[tokio::test]
async fn middleware_added_later_does_not_affect_earlier_routes() {
    let mut app = Engine::new();
    app.get("/early", [mark("early")]).unwrap();
    app.use_middleware([mark("mw")]);
    app.get("/late", [mark("late")]).unwrap();

    assert_eq!(get(&app, "/early").await.2.as_deref(), Some("early"));
    assert_eq!(get(&app, "/late").await.2.as_deref(), Some("mw,late"));
}

#[tokio::test]
async fn aborting_middleware_skips_the_handler() {
    let guard = handler_fn(|ctx| Box::pin(async move {
        if ctx.request_header("authorization").is_none() {
            ctx.error(Status::Unauthorized, "");
        }
    }));
    let around = handler_fn(|ctx| Box::pin(async move {
        ctx.next().await;
        let status = ctx.response().status().to_string();
        ctx.header("x-after", &status);
    }));

    let mut app = Engine::new();
    app.group("/admin", [around, guard])
        .get("/stats", [mark("stats")]).unwrap();

    let denied = app.handle(Request::new(Method::Get, "/admin/stats")).await;
    assert_eq!(denied.status(), 401);
    assert_eq!(denied.header("x-trace"), None);
    assert_eq!(denied.header("x-after"), Some("401"));

    let allowed = app
        .handle(Request::new(Method::Get, "/admin/stats").with_header("Authorization", "t"))
        .await;
    assert_eq!(allowed.status(), 200);
    assert_eq!(allowed.header("x-trace"), Some("stats"));
    assert_eq!(allowed.header("x-after"), Some("200"));
}

#[tokio::test]
async fn store_carries_values_between_handlers() {
    let login = handler_fn(|ctx| Box::pin(async move { ctx.set("user", "ana".to_owned()) }));
    let whoami = handler_fn(|ctx| Box::pin(async move {
        let user = ctx.get::<String>("user").cloned().unwrap_or_default();
        ctx.text(Status::Ok, user);
    }));

    let mut app = Engine::new();
    app.get("/me", [login, whoami.clone()]).unwrap()
        .get("/anon", [whoami]).unwrap();

    assert_eq!(get(&app, "/me").await.1, "ana");
    // The pooled context from /me must not leak its store.
    assert_eq!(get(&app, "/anon").await.1, "");
}

// ── Not found ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn not_found_runs_root_middleware() {
    let mut app = Engine::new();
    app.use_middleware([mark("root")]);

    let (status, body, trace) = get(&app, "/missing").await;
    assert_eq!(status, 404);
    assert_eq!(body, r#"{"code":404,"message":"Not Found"}"#);
    assert_eq!(trace.as_deref(), Some("root"));
}

#[tokio::test]
async fn custom_no_route() {
    let mut app = Engine::new();
    app.no_route([handler_fn(|ctx| Box::pin(async move {
        let path = ctx.path().to_owned();
        ctx.html(Status::NotFound, format!("<h1>{path} is not here</h1>"));
    }))]);

    let res = app.handle(Request::new(Method::Get, "/nope")).await;
    assert_eq!(res.status(), 404);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(res.body().as_ref(), b"<h1>/nope is not here</h1>");
}

#[tokio::test]
async fn cors_preflight_without_options_route() {
    let mut app = Engine::new();
    app.use_middleware([middleware::cors(CorsConfig::default())]);
    app.put("/users/:id", [mark("put")]).unwrap();

    let res = app
        .handle(
            Request::new(Method::Options, "/users/1")
                .with_header("Origin", "https://app.example")
                .with_header("Access-Control-Request-Method", "PUT"),
        )
        .await;
    assert_eq!(res.status(), 204);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
}

// ── Concurrency and faults ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_params() {
    let slow_echo = handler_fn(|ctx| Box::pin(async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        tokio::time::sleep(Duration::from_millis(5)).await;
        ctx.text(Status::Ok, id);
    }));
    let mut app = Engine::new();
    app.get("/items/:id", [slow_echo]).unwrap();
    let app = Arc::new(app);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..64 {
        let app = Arc::clone(&app);
        tasks.spawn(async move {
            let res = app.handle(Request::new(Method::Get, &format!("/items/{i}"))).await;
            (i, String::from_utf8_lossy(res.body()).into_owned())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, body) = joined.unwrap();
        assert_eq!(body, i.to_string());
    }
}

fn explode() {
    panic!("handler bug");
}

#[tokio::test]
async fn recovery_turns_panics_into_500() {
    let mut app = Engine::new();
    app.use_middleware([middleware::recovery(RecoveryConfig::default())]);
    app.get("/boom", [handler_fn(|_ctx| Box::pin(async move { explode() }))]).unwrap()
        .get("/fine", [mark("fine")]).unwrap();

    assert_eq!(get(&app, "/boom").await.0, 500);
    // The engine keeps serving afterwards.
    assert_eq!(get(&app, "/fine").await.0, 200);
}

#[tokio::test]
async fn unrecovered_panic_stays_in_its_task() {
    let mut app = Engine::new();
    app.get("/boom", [handler_fn(|_ctx| Box::pin(async move { explode() }))]).unwrap()
        .get("/fine", [mark("fine")]).unwrap();
    let app = Arc::new(app);

    let crashed = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.handle(Request::new(Method::Get, "/boom")).await }).await
    };
    assert!(crashed.unwrap_err().is_panic());
    assert_eq!(get(&app, "/fine").await.0, 200);
}

#[tokio::test]
async fn timeout_answers_408() {
    let mut app = Engine::new();
    app.use_middleware([middleware::timeout(middleware::TimeoutConfig {
        duration: Duration::from_millis(20),
        on_timeout: None,
    })]);
    app.get("/slow", [handler_fn(|ctx| Box::pin(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        ctx.text(Status::Ok, "late");
    }))]).unwrap();

    assert_eq!(get(&app, "/slow").await.0, 408);
}

#[tokio::test]
async fn timeout_discards_headers_from_the_cancelled_chain() {
    let mut app = Engine::new();
    app.use_middleware([middleware::timeout(middleware::TimeoutConfig {
        duration: Duration::from_millis(20),
        on_timeout: None,
    })]);
    app.get("/login", [handler_fn(|ctx| Box::pin(async move {
        ctx.set_cookie(Cookie::new("session", "abc"));
        tokio::time::sleep(Duration::from_secs(5)).await;
    }))]).unwrap();

    let res = app.handle(Request::new(Method::Get, "/login")).await;
    assert_eq!(res.status(), 408);
    assert_eq!(res.header("set-cookie"), None);
}

// ── Pooling ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn finished_requests_release_stored_values() {
    let shared = Arc::new(vec![0_u8; 64]);
    let held = Arc::clone(&shared);

    let mut app = Engine::new();
    app.post("/upload", [handler_fn(move |ctx| {
        ctx.set("buffer", Arc::clone(&held));
        Box::pin(async move { ctx.text(Status::Ok, "stored") })
    })]).unwrap();

    let res = app.handle(Request::new(Method::Post, "/upload").with_body("payload")).await;
    assert_eq!(res.status(), 200);
    // this test's handle plus the clone captured by the route
    assert_eq!(Arc::strong_count(&shared), 2);
}

// ── Files ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn static_dir_serves_files_under_its_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("site.css"), "body { margin: 0 }").unwrap();

    let mut app = Engine::new();
    app.static_dir("/assets", dir.path()).unwrap();

    let res = app.handle(Request::new(Method::Get, "/assets/site.css")).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("content-type"), Some("text/css"));
    assert_eq!(res.body().as_ref(), b"body { margin: 0 }");

    assert_eq!(get(&app, "/assets/missing.css").await.0, 404);
    assert_eq!(get(&app, "/assets/../site.css").await.0, 404);
}

#[tokio::test]
async fn file_attachment_sets_content_disposition() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("q3.csv");
    std::fs::write(&report, "region,total\nnorth,12\n").unwrap();

    let mut app = Engine::new();
    app.get("/report", [handler_fn(move |ctx| {
        let report = report.clone();
        Box::pin(async move {
            if ctx.file_attachment(&report, Some("report.csv")).await.is_err() {
                ctx.error(Status::NotFound, "");
            }
        })
    })]).unwrap();

    let res = app.handle(Request::new(Method::Get, "/report")).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("content-type"), Some("text/csv"));
    assert_eq!(res.header("content-disposition"), Some("attachment; filename=\"report.csv\""));
    assert_eq!(res.body().as_ref(), b"region,total\nnorth,12\n");
}

// ── Streaming and request helpers ─────────────────────────────────────────────

#[tokio::test]
async fn sse_route_streams_events() {
    let mut app = Engine::new();
    app.get("/events", [handler_fn(|ctx| Box::pin(async move {
        let start: u32 = ctx.default_query("from", "1").parse().unwrap_or(1);
        ctx.sse(move |events| async move {
            for n in start..start + 2 {
                if events.send_json(&serde_json::json!({ "n": n }), Some("tick"), Some(&n.to_string())).await.is_err() {
                    return;
                }
            }
        });
    }))]).unwrap();

    let res = app.handle(Request::new(Method::Get, "/events?from=5")).await;
    assert!(res.is_streaming());
    assert_eq!(res.header("content-type"), Some("text/event-stream"));
    assert_eq!(
        body_of(res).await,
        "id: 5\nevent: tick\ndata: {\"n\":5}\n\nid: 6\nevent: tick\ndata: {\"n\":6}\n\n"
    );
}

#[tokio::test]
async fn login_form_sets_a_session_cookie() {
    let mut app = Engine::new();
    app.post("/login", [handler_fn(|ctx| Box::pin(async move {
        let Some(user) = ctx.post_form("user") else {
            ctx.error(Status::BadRequest, "user required");
            return;
        };
        let theme = ctx.cookie("theme").unwrap_or_else(|| "light".to_owned());
        ctx.set_cookie(Cookie::build(("session", user.clone())).path("/").build());
        ctx.text(Status::Ok, format!("{user} {theme}"));
    }))]).unwrap();

    let res = app.handle(
        Request::new(Method::Post, "/login")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_header("Cookie", "theme=dark")
            .with_body("user=ana"),
    ).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.body().as_ref(), b"ana dark");
    assert_eq!(res.header("set-cookie"), Some("session=ana; Path=/"));

    let res = app.handle(Request::new(Method::Post, "/login")).await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn bind_json_rejects_malformed_bodies() {
    #[derive(serde::Deserialize)]
    struct NewUser { name: String }

    let mut app = Engine::new();
    app.post("/users", [handler_fn(|ctx| Box::pin(async move {
        match ctx.bind_json::<NewUser>() {
            Ok(user) => ctx.json(Status::Created, &serde_json::json!({ "name": user.name })),
            Err(e) => ctx.error(Status::BadRequest, &e.to_string()),
        }
    }))]).unwrap();

    let ok = app.handle(Request::new(Method::Post, "/users").with_body(r#"{"name":"ana"}"#)).await;
    assert_eq!(ok.status(), 201);
    assert_eq!(ok.body().as_ref(), br#"{"name":"ana"}"#);

    let bad = app.handle(Request::new(Method::Post, "/users").with_body("not json")).await;
    assert_eq!(bad.status(), 400);
}
