use std::sync::Arc;

use dayflow::config::Config;
use dayflow::coordinator::Coordinator;
use dayflow::notify::clock::spawn_clock_monitor;
use dayflow::notify::scheduler::NotificationScheduler;
use dayflow::notify::sink::LogSink;
use dayflow::notify::ws::{NotifyState, notify_routes};
use dayflow::planner::DayPlanner;
use dayflow::store::{Database, LibSqlBackend};
use dayflow::tasks::ws::{TaskState, task_routes};
use tower_http::cors::CorsLayer;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    });

    // Initialize tracing: stdout plus a daily-rolling file
    let file_appender = tracing_appender::rolling::daily(&config.server.log_dir, "dayflow.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    eprintln!("Dayflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Task WS:         ws://0.0.0.0:{}/ws/tasks",
        config.server.port
    );
    eprintln!(
        "   Notification WS: ws://0.0.0.0:{}/ws/notifications",
        config.server.port
    );
    eprintln!(
        "   Plan API:        http://0.0.0.0:{}/api/plan",
        config.server.port
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.database.path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!(
                "Error: failed to open database at {}: {}",
                config.database.path, e
            );
            std::process::exit(1);
        }),
    );
    eprintln!("   Database: {}", config.database.path);

    // ── Notification scheduler ────────────────────────────────────────────
    let scheduler = NotificationScheduler::new(Arc::clone(&db), Arc::new(LogSink));

    // Startup recovery: re-arm persisted future notifications
    match scheduler.load_pending().await {
        Ok(count) => eprintln!("   Recovered {} pending notifications", count),
        Err(e) => tracing::warn!(error = %e, "Startup notification recovery failed"),
    }

    let _clock_handle = spawn_clock_monitor(Arc::clone(&scheduler), config.scheduler.clone());

    // ── Coordinator + planner + API ───────────────────────────────────────
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&db), Arc::clone(&scheduler)));
    let planner = Arc::new(DayPlanner::new(Arc::clone(&db), config.planner.clone()));

    let task_state = TaskState::new(
        Arc::clone(&db),
        Arc::clone(&coordinator),
        Arc::clone(&scheduler),
        Arc::clone(&planner),
    );
    let notify_state = NotifyState {
        db: Arc::clone(&db),
        scheduler: Arc::clone(&scheduler),
    };

    let app = task_routes(task_state)
        .merge(notify_routes(notify_state))
        .layer(CorsLayer::permissive());

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port)).await?;
    tracing::info!(port = config.server.port, "Dayflow server started");
    axum::serve(listener, app).await?;

    Ok(())
}
