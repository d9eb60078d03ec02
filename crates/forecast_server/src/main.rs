use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use forecast_server::{AppState, ServerConfig, db, routes, tasks::TaskRunner};

#[derive(Parser)]
#[command(name = "forecast-server", about = "Probabilistic delivery forecasting API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API (default when no subcommand is given).
    Serve,
    /// Apply the SQLite schema to `DB_URL` and exit.
    Migrate,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => migrate(&config),
        Command::Serve => serve(config).await,
    }
}

fn migrate(config: &ServerConfig) {
    let conn = db::open(&config.db_url).expect("failed to open database");
    db::init_schema(&conn).expect("failed to initialize schema");
    tracing::info!(db_url = %config.db_url, "schema applied");
}

async fn serve(config: ServerConfig) {
    let conn = db::open(&config.db_url).expect("failed to open database");
    db::init_schema(&conn).expect("failed to initialize schema");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        tasks: Arc::new(TaskRunner::new(
            config.worker_pool_size,
            config.task_queue_highwater,
            config.task_result_ttl,
        )),
        config: Arc::new(config.clone()),
    };

    spawn_task_sweeper(state.tasks.clone());

    let app = routes::build_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    tracing::info!(
        addr = %config.bind_addr,
        worker_pool_size = config.worker_pool_size,
        milp_time_limit_secs = config.milp_time_limit.as_secs(),
        "forecast-server listening"
    );

    axum::serve(listener, app).await.expect("server error");
}

/// Periodically evicts terminal tasks past their TTL (Task
/// lifecycle). Runs for the process lifetime; there's no join handle to
/// await since the server itself is the thing that keeps the process alive.
fn spawn_task_sweeper(tasks: Arc<TaskRunner>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            tasks.sweep().await;
        }
    });
}
