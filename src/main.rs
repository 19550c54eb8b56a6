use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use zipline::archiver::{Archiver, ArchiverConfig};
use zipline::config::{Config, Env};
use zipline::fetcher::HttpObjectFetcher;
use zipline::http::{self, AppState};
use zipline::logging;
use zipline::storage::LocalZipStorage;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "zipline")]
#[command(about = "HTTP service that fetches remote files and bundles them into ZIP archives")]
struct Args {
    /// Runtime environment
    #[arg(long, value_enum, env = "ENV", default_value = "local")]
    env: Env,

    /// Path to the YAML config file
    #[arg(long, env = "CONFIG_PATH", default_value = "./config/local.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let cfg = Config::load(Path::new(&args.config))?;

    logging::init(args.env, &cfg.logger.dir)?;

    tracing::debug!(env = ?args.env, config = %args.config, "configuration loaded");

    let fetcher = Arc::new(HttpObjectFetcher::new(
        cfg.archiver.archive_object_getter.valid_content_type.clone(),
    )?);

    let zips_base_url = format!("http://{}/zips", cfg.http_server.addr);
    let storage = Arc::new(LocalZipStorage::new(
        &zips_base_url,
        &cfg.local_zip_storage.dir,
    )?);

    let archiver = Arc::new(Archiver::new(
        ArchiverConfig {
            max_tasks: cfg.archiver.max_tasks,
            max_objects: cfg.archiver.max_objects,
        },
        fetcher,
        storage,
    ));

    let state = AppState::new(
        Arc::clone(&archiver),
        &cfg.archiver.valid_extension,
        PathBuf::from(&cfg.local_zip_storage.dir),
    );
    let app = http::router(state, Duration::from_secs(cfg.http_server.idle_timeout));

    let listener = tokio::net::TcpListener::bind(&cfg.http_server.addr).await?;
    tracing::info!(addr = %cfg.http_server.addr, "server listening");

    // The server gets its own stop signal: it must keep answering requests
    // (the archiver's stop latch turns them into 503s) while the archiver
    // drains, and only shut down once that drain is over.
    let server_stop = CancellationToken::new();
    let serve_stop = server_stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_stop.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await?;

    match archiver.stop(SHUTDOWN_TIMEOUT).await {
        Ok(()) => tracing::info!("archiver service stopped"),
        Err(err) => tracing::error!(error = %err, "archiver stop failed"),
    }

    server_stop.cancel();
    server.await??;
    tracing::info!("server shut down");

    Ok(())
}

/// Blocks until SIGINT or SIGTERM arrives.
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM intercepted, application stops");
        }
        _ = sigint.recv() => {
            tracing::info!("SIGINT intercepted, application stops");
        }
    }

    Ok(())
}
