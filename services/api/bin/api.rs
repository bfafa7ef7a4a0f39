//! Main Entrypoint for the Voxbridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Loading the assistant prompt and building the shared services.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use sqlx::PgPool;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use voxbridge_api::{
    config::Config, db::Db, router::create_router, state::AppState, ws::SessionSettings,
};
use voxbridge_core::telephony::TwilioCallPlacer;

const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
    }
}

/// Reads the assistant's system instructions.
fn load_system_prompt(prompts_path: &Path) -> anyhow::Result<String> {
    let path = prompts_path.join(SYSTEM_PROMPT_FILE);
    let prompt = std::fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let prompt = prompt.trim().to_string();
    anyhow::ensure!(!prompt.is_empty(), "{} is empty", path.display());
    Ok(prompt)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(Db::new(pool));
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize Shared Services ---
    let instructions = load_system_prompt(&config.prompts_path)?;
    let session = Arc::new(SessionSettings::from_config(&config.realtime, instructions));
    let call_placer = Arc::new(TwilioCallPlacer::new(
        config.twilio.account_sid.clone(),
        config.twilio.auth_token.clone(),
        config.twilio.phone_number.clone(),
    ));
    if config.public_url.is_none() {
        info!("PUBLIC_URL not set; outbound calls are disabled and webhooks use the Host header.");
    }

    let app_state = Arc::new(AppState {
        store: db.clone(),
        db,
        call_placer,
        session,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.realtime.model,
        voice = %config.realtime.voice,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
