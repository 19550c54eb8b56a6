//! YAML configuration loading.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Runtime environment, selects the logger profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Env {
    Local,
    Dev,
    Prod,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub archiver: ArchiverSection,
    #[serde(default)]
    pub local_zip_storage: LocalZipStorageConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    /// Log file directory; empty means stdout.
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiverSection {
    /// Admission ceiling; 0 falls back to the built-in default.
    #[serde(default)]
    pub max_tasks: u32,
    /// Object slots per task; 0 falls back to the built-in default.
    #[serde(default)]
    pub max_objects: usize,
    /// Filename extension allow-list; empty disables filtering.
    #[serde(default)]
    pub valid_extension: Vec<String>,
    #[serde(default)]
    pub archive_object_getter: ArchiveObjectGetterConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveObjectGetterConfig {
    /// Content-Type allow-list; empty disables the check.
    #[serde(default)]
    pub valid_content_type: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalZipStorageConfig {
    #[serde(default = "default_zip_dir")]
    pub dir: String,
}

impl Default for LocalZipStorageConfig {
    fn default() -> Self {
        Self {
            dir: default_zip_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

fn default_zip_dir() -> String {
    "./zips".to_string()
}

fn default_addr() -> String {
    "localhost:8080".to_string()
}

fn default_idle_timeout() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        let cfg = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }
}
