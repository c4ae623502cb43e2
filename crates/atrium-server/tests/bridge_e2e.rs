//! End-to-end scenarios through the bridge.
//!
//! Each test assembles an in-memory store, a runtime, and a set of
//! real plugins, then exercises the full HTTP/WebSocket surface the
//! way the shell front-end would.

use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{json, Value};

use atrium_db::sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use atrium_migration::{Migrator, MigratorTrait};
use atrium_runtime::{
    route_fn, service_fn, HostConfig, HttpMethod, Plugin, PluginContext, PluginDescriptor,
    PluginManager, PluginRouter, Runtime, RuntimeError, SchemaStep,
};
use atrium_server::state::AppState;
use atrium_server::build_app;

fn descriptor(id: &str) -> PluginDescriptor {
    PluginDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        version: "0.1.0".to_string(),
        description: format!("{id} test plugin"),
        author: None,
        dependencies: Vec::new(),
        priority: 0,
    }
}

async fn test_db() -> DatabaseConnection {
    // One pooled connection: each sqlite::memory: connection is its own
    // database, so the pool must never open a second one.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

async fn harness(
    plugins: Vec<(PluginDescriptor, Arc<dyn Plugin>)>,
) -> (TestServer, Arc<PluginManager>) {
    let db = test_db().await;
    let runtime = Runtime::new(db, HostConfig::default());
    let manager = Arc::new(PluginManager::new(runtime.clone()));

    for (descriptor, plugin) in plugins {
        manager.register(descriptor, plugin).await.unwrap();
    }
    manager.init_all().await;
    manager.start_all().await;

    let app = build_app(AppState {
        runtime,
        manager: manager.clone(),
    });
    (TestServer::new(app).unwrap(), manager)
}

// ─── Test plugins ───────────────────────────────────────────────────

/// Owns a single-row `counter_state` table and exposes read/increment
/// routes over it.
struct CounterPlugin;

#[async_trait]
impl Plugin for CounterPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError> {
        ctx.migrate(&[SchemaStep::new(
            1,
            "CREATE TABLE counter_state (id INTEGER PRIMARY KEY CHECK (id = 1), count INTEGER NOT NULL)",
        )])
        .await?;

        let db = ctx.db().clone();
        db.execute(Statement::from_string(
            DbBackend::Sqlite,
            "INSERT OR IGNORE INTO counter_state (id, count) VALUES (1, 0)",
        ))
        .await?;

        let read_db = db.clone();
        let bump_db = db;
        ctx.register_router(
            PluginRouter::new()
                .route(
                    HttpMethod::Get,
                    "/current",
                    route_fn(move |_| {
                        let db = read_db.clone();
                        async move {
                            let row = db
                                .query_one(Statement::from_string(
                                    DbBackend::Sqlite,
                                    "SELECT count FROM counter_state WHERE id = 1",
                                ))
                                .await?
                                .ok_or_else(|| {
                                    RuntimeError::Service("counter row missing".into())
                                })?;
                            let count: i64 = row.try_get("", "count")?;
                            Ok(json!({ "count": count }))
                        }
                    }),
                )
                .route(
                    HttpMethod::Post,
                    "/increment",
                    route_fn(move |_| {
                        let db = bump_db.clone();
                        async move {
                            db.execute(Statement::from_string(
                                DbBackend::Sqlite,
                                "UPDATE counter_state SET count = count + 1 WHERE id = 1",
                            ))
                            .await?;
                            Ok(json!({ "ok": true }))
                        }
                    }),
                ),
        )
        .await?;
        Ok(())
    }
}

/// Provides the `double` service.
struct DoublerPlugin;

#[async_trait]
impl Plugin for DoublerPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError> {
        ctx.provide_service(
            "double",
            service_fn(|payload| async move {
                let n = payload
                    .as_i64()
                    .ok_or_else(|| RuntimeError::Service("expected a number".into()))?;
                Ok(json!(n * 2))
            }),
        )
        .await;
        Ok(())
    }
}

/// Calls `doubler.double` from a route handler.
struct RelayPlugin;

#[async_trait]
impl Plugin for RelayPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError> {
        let handle = ctx.handle();
        ctx.register_router(PluginRouter::new().route(
            HttpMethod::Get,
            "/answer",
            route_fn(move |_| {
                let handle = handle.clone();
                async move {
                    let doubled = handle.call_service("doubler", "double", json!(21)).await?;
                    Ok(json!({ "answer": doubled }))
                }
            }),
        ))
        .await?;
        Ok(())
    }
}

/// Owns `notes_items` and exposes add/count routes over it.
struct NotesPlugin;

#[async_trait]
impl Plugin for NotesPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError> {
        ctx.migrate(&[SchemaStep::new(
            1,
            "CREATE TABLE notes_items (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)",
        )])
        .await?;

        let insert_db = ctx.db().clone();
        let count_db = ctx.db().clone();
        ctx.register_router(
            PluginRouter::new()
                .route(
                    HttpMethod::Post,
                    "/add",
                    route_fn(move |req| {
                        let db = insert_db.clone();
                        async move {
                            let body = req.body["body"].as_str().unwrap_or("untitled").to_string();
                            db.execute(Statement::from_sql_and_values(
                                DbBackend::Sqlite,
                                "INSERT INTO notes_items (body) VALUES (?)",
                                [body.into()],
                            ))
                            .await?;
                            Ok(json!({ "ok": true }))
                        }
                    }),
                )
                .route(
                    HttpMethod::Get,
                    "/count",
                    route_fn(move |_| {
                        let db = count_db.clone();
                        async move {
                            let row = db
                                .query_one(Statement::from_string(
                                    DbBackend::Sqlite,
                                    "SELECT COUNT(*) AS n FROM notes_items",
                                ))
                                .await?
                                .ok_or_else(|| RuntimeError::Service("count query empty".into()))?;
                            let n: i64 = row.try_get("", "n")?;
                            Ok(json!({ "count": n }))
                        }
                    }),
                ),
        )
        .await?;
        Ok(())
    }
}

// ─── Scenario 1: migration + route ──────────────────────────────────

#[tokio::test]
async fn counter_route_returns_zero_initially() {
    let (server, _manager) =
        harness(vec![(descriptor("counter"), Arc::new(CounterPlugin))]).await;

    let response = server.get("/counter/current").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 0);
}

// ─── Scenario 2: cross-plugin service call ──────────────────────────

#[tokio::test]
async fn relay_route_calls_doubler_service() {
    let (server, _manager) = harness(vec![
        (descriptor("doubler"), Arc::new(DoublerPlugin)),
        (descriptor("relay"), Arc::new(RelayPlugin)),
    ])
    .await;

    let response = server.get("/relay/answer").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["answer"], 42);
}

// ─── Scenario 3: disable leaves no stale service ────────────────────

#[tokio::test]
async fn disabled_plugin_service_returns_not_found_not_stale_success() {
    let (server, manager) = harness(vec![
        (descriptor("doubler"), Arc::new(DoublerPlugin)),
        (descriptor("relay"), Arc::new(RelayPlugin)),
    ])
    .await;

    server.get("/relay/answer").await.assert_status_ok();

    manager.disable("doubler").await.unwrap();

    // The relay still holds the service id; its call now fails cleanly.
    let err = manager
        .runtime()
        .services()
        .call("doubler", "double", json!(21))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ServiceNotFound { .. }));

    let response = server.get("/relay/answer").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("service not found"));
}

// ─── Scenario 4: concurrent writers through the shared store ────────

#[tokio::test]
async fn concurrent_writes_from_two_plugins_do_not_corrupt() {
    let (server, _manager) = harness(vec![
        (descriptor("counter"), Arc::new(CounterPlugin)),
        (descriptor("notes"), Arc::new(NotesPlugin)),
    ])
    .await;

    let (a, b, c, d) = tokio::join!(
        server.post("/counter/increment"),
        server.post("/notes/add").json(&json!({"body": "first"})),
        server.post("/counter/increment"),
        server.post("/notes/add").json(&json!({"body": "second"})),
    );
    for response in [a, b, c, d] {
        response.assert_status_ok();
    }

    let counter: Value = server.get("/counter/current").await.json();
    assert_eq!(counter["count"], 2);
    let notes: Value = server.get("/notes/count").await.json();
    assert_eq!(notes["count"], 2);
}

// ─── Namespace isolation over HTTP ──────────────────────────────────

struct StaticPlugin {
    reply: &'static str,
}

#[async_trait]
impl Plugin for StaticPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), RuntimeError> {
        let reply = self.reply;
        ctx.register_router(PluginRouter::new().route(
            HttpMethod::Get,
            "/data",
            route_fn(move |_| async move { Ok(json!({ "from": reply })) }),
        ))
        .await?;
        Ok(())
    }
}

#[tokio::test]
async fn identical_subpaths_stay_isolated_per_namespace() {
    let (server, _manager) = harness(vec![
        (
            descriptor("alpha"),
            Arc::new(StaticPlugin { reply: "alpha" }) as Arc<dyn Plugin>,
        ),
        (
            descriptor("beta"),
            Arc::new(StaticPlugin { reply: "beta" }) as Arc<dyn Plugin>,
        ),
    ])
    .await;

    let alpha: Value = server.get("/alpha/data").await.json();
    let beta: Value = server.get("/beta/data").await.json();
    assert_eq!(alpha["from"], "alpha");
    assert_eq!(beta["from"], "beta");
}

// ─── Built-in surface ───────────────────────────────────────────────

#[tokio::test]
async fn introspection_lists_plugins_services_and_routes() {
    let (server, _manager) = harness(vec![
        (descriptor("counter"), Arc::new(CounterPlugin)),
        (descriptor("doubler"), Arc::new(DoublerPlugin)),
    ])
    .await;

    let plugins: Value = server.get("/api/plugins").await.json();
    let listed = plugins["plugins"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|p| p["state"] == "running"));

    let services: Value = server.get("/api/services").await.json();
    assert_eq!(services["services"][0]["plugin"], "doubler");
    assert_eq!(services["services"][0]["method"], "double");

    let routes: Value = server.get("/api/routes").await.json();
    let paths: Vec<&str> = routes["routes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/current"));
    assert!(paths.contains(&"/increment"));
}

#[tokio::test]
async fn disable_via_api_removes_routes_and_reports_state() {
    let (server, _manager) =
        harness(vec![(descriptor("counter"), Arc::new(CounterPlugin))]).await;

    server.get("/counter/current").await.assert_status_ok();

    let response = server.post("/api/plugins/counter/disable").await;
    response.assert_status_ok();

    server.get("/counter/current").await.assert_status_not_found();

    let plugins: Value = server.get("/api/plugins").await.json();
    assert_eq!(plugins["plugins"][0]["state"], "disabled");
}

#[tokio::test]
async fn disable_unknown_plugin_is_404() {
    let (server, _manager) = harness(Vec::new()).await;
    server
        .post("/api/plugins/ghost/disable")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn reload_via_api_restores_a_working_plugin() {
    let (server, _manager) =
        harness(vec![(descriptor("counter"), Arc::new(CounterPlugin))]).await;

    server.post("/counter/increment").await.assert_status_ok();

    server
        .post("/api/plugins/counter/reload")
        .await
        .assert_status_ok();

    // The counter table survives a reload (migrations are idempotent)
    // and the route is reachable again.
    let counter: Value = server.get("/counter/current").await.json();
    assert_eq!(counter["count"], 1);
}

#[tokio::test]
async fn unknown_route_is_404_and_healthz_is_open() {
    let (server, _manager) = harness(Vec::new()).await;

    server.get("/healthz").await.assert_status_ok();
    let response = server.get("/nothing/here").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("route not found"));
}

// ─── WebSocket bridge ───────────────────────────────────────────────

#[tokio::test]
async fn websocket_sends_welcome_then_forwards_events() {
    let db = test_db().await;
    let runtime = Runtime::new(db, HostConfig::default());
    let manager = Arc::new(PluginManager::new(runtime.clone()));
    let app = build_app(AppState {
        runtime: runtime.clone(),
        manager,
    });

    // WebSockets need the real HTTP transport.
    let server = TestServer::builder().http_transport().build(app).unwrap();
    let mut socket = server.get_websocket("/ws").await.into_websocket().await;

    let welcome: Value = socket.receive_json().await;
    assert_eq!(welcome["type"], "connected");
    assert_eq!(welcome["channel"], "events");
    assert!(welcome["message"].as_str().is_some());

    runtime.bus().publish("tester", "ping", json!({"n": 1}));

    let frame: Value = socket.receive_json().await;
    assert_eq!(frame["source_plugin"], "tester");
    assert_eq!(frame["event_type"], "ping");
    assert_eq!(frame["payload"]["n"], 1);
    assert!(frame["timestamp"].as_u64().unwrap() > 0);
}
