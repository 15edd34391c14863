use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use auth_gateway::{AuthGateway, BackgroundTasks};
use auth_identity::NewPrincipal;
use clap::Parser;
use config_engine::{ConfigLoader, ValidateConfig};
use database_layer::CredentialStore;
use hearth_server::{create_app, ServerConfig, TrustedProxies};
use logger_redacted::{init_tracing, PiiRedactor, RedactionConfig};
use tracing::{info, warn};

const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

/// Hearth identity server
#[derive(Parser, Debug)]
#[command(name = "hearth-server", version, about = "Identity and access core for the Hearth household assistant")]
struct Args {
    /// Configuration file (TOML, YAML or JSON); `hearth.toml` is read if present
    #[arg(short, long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(long, env = "HEARTH_BIND")]
    bind: Option<String>,

    /// SQLite URL, overrides the configuration
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside development
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_file(path, true),
        None => ConfigLoader::new().with_file(DEFAULT_CONFIG_FILE, false),
    }
    .with_env_prefix("HEARTH");
    let mut config: ServerConfig = loader.load().context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if args.log_json {
        config.logging.json = true;
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging).context("failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), bind = %config.bind, "Starting Hearth identity server");

    let store = CredentialStore::open(&config.database)
        .await
        .context("credential store unavailable")?;
    let redactor = PiiRedactor::new(RedactionConfig::from(&config.logging));
    let gateway = Arc::new(AuthGateway::new(store.clone(), config.auth.clone(), redactor)?);

    if let Some(admin) = &config.bootstrap_admin {
        let created = gateway
            .bootstrap_admin(NewPrincipal {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: Some(admin.password.clone()),
                role: None,
                settings: Default::default(),
            })
            .await?;
        if created.is_none() {
            info!("Principals already exist, bootstrap administrator skipped");
        }
    }

    let tasks = BackgroundTasks::spawn(Arc::clone(&gateway), &config.auth.scheduler);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    let proxies = TrustedProxies::new(config.trusted_proxies.iter().copied());
    let app = create_app(Arc::clone(&gateway), proxies);
    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tasks.shutdown().await;
    store.close().await;
    served.context("HTTP server error")?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
