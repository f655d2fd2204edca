//! Minimal waypost demo: a JSON API group, static files and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42 -H 'authorization: Bearer demo'
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'authorization: Bearer demo' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/api/users/42 -H 'authorization: Bearer demo'
//!   curl http://localhost:3000/assets/Cargo.toml
//!   curl -N http://localhost:3000/clock?every=2
//!   curl http://localhost:3000/healthz

use std::time::Duration;

use serde::Deserialize;
use waypost::middleware::{self, CorsConfig, LoggerConfig, SecureConfig};
use waypost::{BoxFuture, Context, Engine, Server, Status, handler_fn, health};

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), waypost::Error> {
    tracing_subscriber::fmt::init();

    let mut app = Engine::new();
    app.use_middleware([
        middleware::logger(LoggerConfig { skip_paths: vec!["/healthz".into(), "/readyz".into()] }),
        middleware::recovery(Default::default()),
        middleware::secure(SecureConfig::default()),
        middleware::cors(CorsConfig::default()),
    ]);

    app.get("/healthz", [handler_fn(health::liveness)])?
        .get("/readyz", [handler_fn(health::readiness)])?
        .get("/clock", [handler_fn(clock)])?
        .static_dir("/assets", ".")?;

    app.group("/api", [handler_fn(require_token)])
        .get("/users/:id", [handler_fn(get_user)])?
        .post("/users", [handler_fn(create_user)])?
        .delete("/users/:id", [handler_fn(delete_user)])?;

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// Any bearer token will do; a real app would verify it and store the user.
fn require_token(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        match ctx.request_header("authorization").and_then(|v| v.strip_prefix("Bearer ")) {
            Some(token) => {
                let token = token.to_owned();
                ctx.set("token", token);
            }
            None => ctx.error(Status::Unauthorized, "missing bearer token"),
        }
    })
}

// GET /api/users/:id
fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        ctx.json(Status::Ok, &serde_json::json!({ "id": id, "name": "alice" }));
    })
}

// POST /api/users
fn create_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let input: CreateUser = match ctx.bind_json() {
            Ok(input) => input,
            Err(e) => return ctx.error(Status::BadRequest, &e.to_string()),
        };
        ctx.header("location", "/api/users/99");
        ctx.json(Status::Created, &serde_json::json!({ "id": "99", "name": input.name }));
    })
}

// DELETE /api/users/:id → 204 No Content
fn delete_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { ctx.status(Status::NoContent) })
}

// GET /clock?every=N → one SSE tick every N seconds until the client leaves
fn clock(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let every: u64 = ctx.default_query("every", "1").parse().unwrap_or(1).max(1);
        ctx.sse(move |events| async move {
            let mut tick = 0_u64;
            while events.send(&tick.to_string(), Some("tick"), None).await.is_ok() {
                tick += 1;
                tokio::time::sleep(Duration::from_secs(every)).await;
            }
        });
    })
}
