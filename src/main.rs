use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use gigachat_auth::{auth, config, middleware, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("GigaChat token service starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let token_manager = Arc::new(auth::TokenManager::new(config.token_settings())?);

    // Warm the cache so the first request does not wait on the auth endpoint
    match token_manager.get_token().await {
        Ok(token) => {
            let preview: String = token.chars().take(12).collect();
            tracing::info!("Authorization successful (token: {}...)", preview);
        }
        Err(e) => {
            tracing::error!("Authorization failed: {:#}", e);
            tracing::warn!("Server will start; tokens will be requested again on demand");
        }
    }

    let cancel = CancellationToken::new();
    let refresh_task = auth::spawn_refresh_task(
        token_manager.clone(),
        config.refresh_schedule(),
        cancel.clone(),
    );

    let app = build_app(routes::AppState::new(token_manager, &config));

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = refresh_task.await {
        tracing::warn!("Background refresh task ended abnormally: {}", e);
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    axum::Router::new()
        .merge(routes::health_routes())
        .merge(routes::token_routes(state))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  GigaChat token service");
    println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:       http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Auth URL:     {}", config.auth_url);
    println!("  Scope:        {}", config.scope);
    println!("  Token file:   {}", config.token_file.display());
    println!(
        "  Refresh:      every {}s, {}s ahead of expiry",
        config.refresh_interval, config.background_threshold
    );
    println!(
        "  Admin key:    {}",
        if config.admin_api_key.is_some() {
            "required"
        } else {
            "not set"
        }
    );
    println!("  Log Level:    {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
