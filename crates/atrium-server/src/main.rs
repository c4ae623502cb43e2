use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use atrium_migration::MigratorTrait;
use atrium_runtime::{HostConfig, PluginManager, Runtime};
use atrium_server::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Store connection
    let db_config = atrium_db::DatabaseConfig::from_env();
    tracing::info!(url = %db_config.url, "connecting to store...");
    let db = atrium_db::connect(&db_config)
        .await
        .expect("failed to connect to store");

    // Host-level migrations (the plugin migration tracker table)
    tracing::info!("running host migrations...");
    atrium_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run host migrations");
    tracing::info!("host migrations complete");

    let host_config = HostConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", host_config.host, host_config.port)
        .parse()
        .expect("invalid bind address");

    let runtime = Runtime::new(db, host_config);
    let manager = Arc::new(PluginManager::new(runtime.clone()));

    // The shell's generated registration glue adds plugins here, before
    // the lifecycle batches run. With none registered the bridge still
    // serves the built-in introspection surface.
    manager.init_all().await;
    manager.start_all().await;

    let plugin_count = manager.list().await.len();
    tracing::info!(plugins = plugin_count, "plugin lifecycle complete");

    let app = atrium_server::build_app(AppState {
        runtime,
        manager: manager.clone(),
    });

    tracing::info!(%addr, "bridge server started");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    let shutdown_manager = manager.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, stopping plugins");
            shutdown_manager.dispose_all().await;
        })
        .await
        .expect("server error");
}
