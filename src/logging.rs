//! Environment-aware logger setup.
//!
//! `local` logs human-readable at DEBUG, `dev` JSON at DEBUG, `prod` JSON at
//! INFO. When a log directory is configured, output goes to a freshly
//! created timestamped file there instead of stdout. `RUST_LOG` overrides
//! the per-environment level.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::Env;
use crate::error::Result;

pub fn init(env: Env, dir: &str) -> Result<()> {
    let writer = if dir.is_empty() {
        BoxMakeWriter::new(io::stdout)
    } else {
        BoxMakeWriter::new(Arc::new(create_log_file(Path::new(dir))?))
    };

    match env {
        Env::Local => tracing_subscriber::fmt()
            .with_env_filter(env_filter("debug"))
            .with_writer(writer)
            .init(),
        Env::Dev => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter("debug"))
            .with_writer(writer)
            .init(),
        Env::Prod => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter("info"))
            .with_writer(writer)
            .init(),
    }

    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn create_log_file(dir: &Path) -> Result<File> {
    if !dir.exists() {
        create_log_dir(dir)?;
    }

    let name = format!("{}.log", Utc::now().format("%Y-%m-%d_%H.%M.%S"));
    let file = File::create(dir.join(name))?;

    Ok(file)
}

#[cfg(unix)]
fn create_log_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().mode(0o774).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_log_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir(dir)?;
    Ok(())
}
