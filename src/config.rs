use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TABLE_ENV: &str = "TABLE_NAME";
/// The forms API accepts page sizes between 20 and 50.
pub const MIN_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;
pub const MAX_WORKERS: usize = 40;
const DEFAULT_SUMMARY_TTL_DAYS: i64 = 7;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Conditions that stop a run before any form is touched. They need an
/// operator, so they are reported rather than retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("checkpoint table not configured; pass --table, set TABLE_NAME, or set `table` in the config file")]
    MissingTable,
    #[error("credentials record not found in {0}")]
    MissingCredentials(String),
    #[error("form {0} is not defined in the checkpoint table")]
    UnknownForm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub table: PathBuf,
    pub page_size: usize,
    pub workers: usize,
    pub summary_ttl_days: i64,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn new(table: PathBuf) -> Self {
        Self {
            table,
            page_size: MIN_PAGE_SIZE,
            workers: 1,
            summary_ttl_days: DEFAULT_SUMMARY_TTL_DAYS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Values given on the command line; they win over env and file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub table: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub table: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub workers: Option<usize>,
    pub summary_ttl_days: Option<i64>,
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFileConfig {
    version: Option<u32>,
    table: Option<String>,
    sync: Option<RawSyncSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSyncSection {
    page_size: Option<usize>,
    workers: Option<usize>,
    summary_ttl_days: Option<i64>,
    http_timeout_secs: Option<u64>,
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let parsed: RawFileConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    validate_file_config(parsed, path)
}

fn validate_file_config(raw: RawFileConfig, path: &Path) -> Result<FileConfig> {
    let version = raw
        .version
        .ok_or_else(|| anyhow::anyhow!("{} missing required `version`", path.display()))?;
    if version != 1 {
        bail!(
            "{} has unsupported version {version}; expected version = 1",
            path.display()
        );
    }

    let table = raw
        .table
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(PathBuf::from);

    let Some(sync) = raw.sync else {
        return Ok(FileConfig {
            table,
            ..FileConfig::default()
        });
    };

    if let Some(page_size) = sync.page_size {
        validate_page_size(page_size)
            .with_context(|| format!("{} has invalid `[sync].page_size`", path.display()))?;
    }
    if let Some(workers) = sync.workers {
        validate_workers(workers)
            .with_context(|| format!("{} has invalid `[sync].workers`", path.display()))?;
    }
    if let Some(days) = sync.summary_ttl_days
        && days <= 0
    {
        bail!(
            "{} has non-positive `[sync].summary_ttl_days`",
            path.display()
        );
    }
    if sync.http_timeout_secs == Some(0) {
        bail!("{} has zero `[sync].http_timeout_secs`", path.display());
    }

    Ok(FileConfig {
        table,
        page_size: sync.page_size,
        workers: sync.workers,
        summary_ttl_days: sync.summary_ttl_days,
        http_timeout_secs: sync.http_timeout_secs,
    })
}

fn validate_page_size(page_size: usize) -> Result<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        bail!("page size {page_size} outside {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}");
    }
    Ok(())
}

fn validate_workers(workers: usize) -> Result<()> {
    if !(1..=MAX_WORKERS).contains(&workers) {
        bail!("worker count {workers} outside 1..={MAX_WORKERS}");
    }
    Ok(())
}

/// Resolves the run configuration: CLI overrides, then `TABLE_NAME`, then
/// the optional config file.
pub fn resolve(overrides: &ConfigOverrides) -> Result<SyncConfig> {
    let env_table = std::env::var(TABLE_ENV).ok();
    resolve_with_env(overrides, env_table.as_deref())
}

pub fn resolve_with_env(
    overrides: &ConfigOverrides,
    env_table: Option<&str>,
) -> Result<SyncConfig> {
    let file = overrides
        .config_file
        .as_deref()
        .map(load_file_config)
        .transpose()?
        .unwrap_or_default();

    let table = overrides
        .table
        .clone()
        .or_else(|| {
            env_table
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(PathBuf::from)
        })
        .or(file.table)
        .ok_or(ConfigError::MissingTable)?;

    if let Some(workers) = overrides.workers {
        validate_workers(workers).context("invalid --workers")?;
    }

    let mut cfg = SyncConfig::new(table);
    if let Some(page_size) = file.page_size {
        cfg.page_size = page_size;
    }
    if let Some(workers) = overrides.workers.or(file.workers) {
        cfg.workers = workers;
    }
    if let Some(days) = file.summary_ttl_days {
        cfg.summary_ttl_days = days;
    }
    if let Some(secs) = file.http_timeout_secs {
        cfg.http_timeout_secs = secs;
    }
    Ok(cfg)
}
