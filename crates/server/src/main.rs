mod api;
mod cli;
mod live;
mod router;
mod startup;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use newswire_core::config::LoggingConfig;

use crate::cli::{Cli, Command};

fn load_config(cli: &Cli) -> newswire_core::Config {
    newswire_core::config::load_dotenv();
    let mut config = match &cli.profile {
        Some(profile) => newswire_core::Config::for_profile(profile),
        None => newswire_core::Config::from_env(),
    };
    cli.apply_overrides(&mut config);
    config
}

/// Log to stdout and to a daily-rolling file. The returned guard flushes the
/// file writer on drop and must live until exit.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.dir)?;
    let file_appender = tracing_appender::rolling::daily(&logging.dir, "newswire.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();
    Ok(guard)
}

/// Resolve on Ctrl-C, SIGTERM, or an internal cancel; cancels `token` so every
/// background task sees the same shutdown.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = token.cancelled() => {}
    }
    token.cancel();
}

async fn serve(config: &newswire_core::Config) -> anyhow::Result<()> {
    let state = startup::build_app_state(config).await?;
    let tasks = startup::spawn_background_tasks(&state).await;

    let app = router::build_router(state.clone(), &config.server.cors_origin);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    startup::shutdown(&state, tasks).await;
    Ok(())
}

async fn fetch_once(config: &newswire_core::Config) -> anyhow::Result<()> {
    let state = startup::build_app_state(config).await?;
    let summary = state.scheduler.run_now().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    state.bridge.close().await;
    state.store.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli);
    let _log_guard = init_tracing(&config.logging)?;
    config.log_summary();

    match cli.command() {
        Command::Serve => serve(&config).await,
        Command::FetchOnce => fetch_once(&config).await,
    }
}
