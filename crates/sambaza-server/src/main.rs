use anyhow::Result;
use chrono::Utc;
use sambaza_storage::Store;
use sambaza_webhook::dispatcher::WebhookDispatcher;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

use sambaza_server::app;
use sambaza_server::config::{self, ServerConfig};
use sambaza_server::delivery::DeliveryTracker;
use sambaza_server::service_seed;
use sambaza_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  sambaza-server [config.toml]                          Start the server");
    eprintln!("  sambaza-server init-services <config.toml> [seed.json]  Initialize service catalog (defaults when seed omitted)");
}

#[tokio::main]
async fn main() -> Result<()> {
    sambaza_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sambaza=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-services") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-services requires <config.toml> argument")
            })?;
            run_init_services(config_path, args.get(3).map(String::as_str)).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

/// Initialize the service catalog from the built-in defaults or a seed file.
async fn run_init_services(config_path: &str, seed_path: Option<&str>) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = Store::new(
        &config.database.connection_url(),
        Path::new(&config.database.data_dir),
    )
    .await?;
    if let Some(path) = seed_path {
        service_seed::init_from_seed_file(&store, path).await?;
    } else {
        service_seed::init_default_services(&store).await?;
    }
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "Config file not loaded, using defaults");
            ServerConfig::default()
        }
    };

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.database.data_dir,
        db = %config.database.redacted_url(),
        "sambaza-server starting"
    );

    let store = Arc::new(
        Store::new(
            &config.database.connection_url(),
            Path::new(&config.database.data_dir),
        )
        .await?,
    );
    let dispatcher = Arc::new(WebhookDispatcher::new(store.clone()));

    // Seed the service catalog (only when the DB has none)
    if let Err(e) = service_seed::init_default_services(&store).await {
        tracing::error!(error = %e, "Failed to seed service catalog");
    }

    // Default admin account: create if users table is empty
    match store.count_users().await {
        Ok(0) => {
            let password_hash = sambaza_storage::auth::hash_token(&config.auth.default_password)?;
            match store
                .create_user(&config.auth.default_username, &password_hash)
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        username = %config.auth.default_username,
                        "Created default admin account"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create default admin account");
                }
            }
        }
        Ok(count) => {
            tracing::info!(
                count,
                "Users table already has accounts, skipping default admin creation"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to check users table");
        }
    }

    // JWT secret: use configured value or generate random
    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => Arc::new(secret.clone()),
        None => {
            let secret = sambaza_storage::auth::generate_token();
            tracing::warn!("No jwt_secret configured. A random secret was generated and will change on restart. Set [auth].jwt_secret in config for production use.");
            Arc::new(secret)
        }
    };

    let (sms, mpesa, mailer) = AppState::build_clients(&config);
    if sms.is_none() {
        tracing::warn!("SMS gateway not configured; messaging endpoints will answer 503");
    }
    if mpesa.is_none() {
        tracing::warn!("M-Pesa gateway not configured; payment initiation will answer 503");
    }

    let state = AppState {
        store: store.clone(),
        dispatcher: dispatcher.clone(),
        sms,
        mpesa,
        mailer,
        jwt_secret,
        token_expire_secs: config.auth.token_expire_secs,
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    // HTTP/REST server
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state.clone());
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(
        http_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    // Periodic cleanup of webhook delivery logs
    let retention_days = config.retention.webhook_log_days;
    let cleanup_store = store.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600)); // Every hour
        loop {
            tick.tick().await;
            match cleanup_store.cleanup_webhook_deliveries(retention_days).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Cleaned up expired webhook delivery logs")
                }
                Err(e) => tracing::error!(error = %e, "Webhook delivery log cleanup failed"),
                _ => {}
            }
        }
    });

    // Delivery tracking poller
    let delivery_handle = if config.delivery_tracking.enabled {
        let tracker = DeliveryTracker::new(state.clone(), config.delivery_tracking.tick_secs);
        Some(tokio::spawn(async move {
            tracker.run().await;
        }))
    } else {
        tracing::info!("Delivery tracker disabled");
        None
    };

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    cleanup_handle.abort();
    if let Some(h) = delivery_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
