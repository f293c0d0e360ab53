use std::net::SocketAddr;
use std::sync::Arc;

use chat_interview::config::ServerConfig;
use chat_interview::interview::{AppState, TurnCoordinator, cors_layer, interview_routes};
use chat_interview::store::{Database, LibSqlBackend, spawn_session_sweep};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("Chat Interview v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Questions: {:?}", config.question_source);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/whichQuestion", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .map_err(|e| format!("Failed to open database at {}: {e}", config.db_path.display()))?,
    );
    let _sweep = spawn_session_sweep(Arc::clone(&db), config.sweep_interval);

    // ── Interview ────────────────────────────────────────────────────────
    let source = config.build_question_source()?;
    tracing::info!(
        source = source.name(),
        budget = ?source.budget(),
        onboarding = ?source.onboarding(),
        "Question source ready"
    );
    let coordinator = Arc::new(TurnCoordinator::new(db, source, config.session_policy()));

    let state = AppState {
        coordinator,
        cookie_key: config.cookie_key()?,
        cookie_secure: config.cookie_secure,
    };

    let mut app = interview_routes(state);
    if let Some(origin) = &config.frontend_url {
        app = app.layer(cors_layer(origin)?);
        tracing::info!(origin = %origin, "CORS enabled");
    }

    // ── Serve ────────────────────────────────────────────────────────────
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Interview server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
