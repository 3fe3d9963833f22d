//! Tollgate token server binary.
//!
//! Loads the YAML config, waits for a PostgreSQL primary, runs migrations
//! and serves the token endpoints until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tollgate_api::config::{ConfigError, parse_config};
use tollgate_core::auth::jwt::generate_signing_key;
use tollgate_core::auth::service::TokenService;
use tollgate_core::cluster::{ClusterRouter, RouterOptions};
use tollgate_core::notify::smtp::SmtpMailer;
use tollgate_core::store::pg::PgTokenStore;
use tracing::{info, warn};

/// CLI arguments for the token server.
#[derive(Parser, Debug)]
#[command(name = "tollgate_server", about = "Tollgate token server")]
struct Args {
    /// Path to the YAML config file.
    #[arg(long, default_value = "./config.yaml")]
    config: String,

    /// Access-token signing key. A random key is generated when omitted.
    #[arg(long = "jwt-key", env = "JWT_SECRET", hide_env_values = true)]
    jwt_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tollgate_core=debug,tollgate_api=debug")
            }),
        )
        .init();

    let args = Args::parse();
    info!(config = %args.config, "starting tollgate_server");

    let config = parse_config(&args.config)?;
    let (server, pg) = config.validate()?;

    let nodes = pg
        .nodes()
        .map_err(|source| ConfigError::Invalid { section: "pg", source })?;
    let router = Arc::new(ClusterRouter::connect(nodes, RouterOptions::default()).await?);

    info!("running database migrations");
    let primary = router.primary()?;
    tollgate_core::migrate::migrate(primary.pool()).await?;

    let signing_key = match args.jwt_key.filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => {
            warn!("no signing key configured, access tokens will not survive a restart");
            generate_signing_key()
        }
    };

    let store = Arc::new(PgTokenStore::new(Arc::clone(&router)));
    let mut service = TokenService::new(signing_key, store);
    match &config.mailer {
        Some(mailer) => {
            let smtp = SmtpMailer::new(mailer)?;
            service = service.with_notifier(
                Arc::new(smtp),
                mailer.author_name.clone(),
                mailer.recipient(),
            );
        }
        None => warn!("mailer not configured, IP mismatch warnings will only be logged"),
    }

    let state = tollgate_api::AppState {
        tokens: Arc::new(service),
    };
    let app = tollgate_api::router(state);

    let listener = tokio::net::TcpListener::bind(server.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "token API listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    })
    .await;

    router.close().await;
    served?;

    Ok(())
}
