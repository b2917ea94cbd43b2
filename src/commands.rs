use crate::clients::http::HttpClients;
use crate::config::{self, ConfigError, ConfigOverrides, SyncConfig};
use crate::store::checkpoints::CheckpointStore;
use crate::store::{Credentials, FormDefinition};
use crate::sync::{self, InvocationEvent, RunReport, RunScope, SyncContext};
use anyhow::{Result, bail};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct TableArgs {
    pub table: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl TableArgs {
    fn resolve(&self, workers: Option<usize>) -> Result<SyncConfig> {
        config::resolve(&ConfigOverrides {
            table: self.table.clone(),
            config_file: self.config.clone(),
            workers,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunCommand {
    pub table: TableArgs,
    pub form: Option<String>,
    pub event: Option<PathBuf>,
    pub workers: Option<usize>,
    pub log: Option<PathBuf>,
}

pub fn execute_run(cmd: RunCommand) -> Result<RunReport> {
    match run_with_http(cmd) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report)
        }
        Err(err) => {
            if let Some(cfg_err) = err.downcast_ref::<ConfigError>() {
                println!(
                    "{}",
                    json!({"status": "aborted", "error": cfg_err.to_string()})
                );
            }
            Err(err)
        }
    }
}

fn run_with_http(cmd: RunCommand) -> Result<RunReport> {
    let cfg = cmd.table.resolve(cmd.workers)?;
    let scope = match (cmd.form, cmd.event) {
        (Some(_), Some(_)) => bail!("--form and --event are mutually exclusive"),
        (Some(form_id), None) => RunScope::Form(form_id),
        (None, Some(path)) => RunScope::Event(InvocationEvent::load(&path)?),
        (None, None) => RunScope::AllForms,
    };
    let clients = HttpClients::new(Duration::from_secs(cfg.http_timeout_secs))?;
    let ctx = SyncContext {
        cfg: &cfg,
        source: &clients,
        destination: &clients,
        ndjson_log: cmd.log.as_deref(),
    };
    sync::run_sync(&ctx, scope)
}

pub fn add_form(table: &TableArgs, form: FormDefinition) -> Result<()> {
    if form.form_id.trim().is_empty() {
        bail!("form id must not be empty");
    }
    let cfg = table.resolve(None)?;
    let store = CheckpointStore::open(&cfg.table)?;
    store.put_form(&form)?;
    info!(form_id = %form.form_id, "form definition stored");
    println!("Stored form {} ({})", form.form_id, form.description);
    Ok(())
}

pub fn set_credentials(table: &TableArgs, creds: Credentials) -> Result<()> {
    let cfg = table.resolve(None)?;
    let store = CheckpointStore::open(&cfg.table)?;
    store.put_credentials(&creds)?;
    println!("Stored credentials in {}", cfg.table.display());
    Ok(())
}

pub fn inspect(table: &TableArgs, summaries: usize) -> Result<()> {
    let cfg = table.resolve(None)?;
    let store = CheckpointStore::open(&cfg.table)?;

    println!("table: {}", cfg.table.display());
    println!(
        "credentials: {}",
        if store.get_credentials()?.is_some() {
            "configured"
        } else {
            "missing"
        }
    );

    let forms = store.get_forms()?;
    if forms.is_empty() {
        println!("forms: none");
    } else {
        println!("forms:");
    }
    for form in forms {
        match store.get_checkpoint(&form.form_id)? {
            Some(cp) => println!(
                "  - {} ({}) topic={} last_submitted={} count={}",
                form.form_id,
                form.description,
                form.topic_id,
                cp.last_submitted_at_iso,
                cp.submitted_count
            ),
            None => println!(
                "  - {} ({}) topic={} last_submitted=never",
                form.form_id, form.description, form.topic_id
            ),
        }
    }

    let recent = store.list_summaries(Some(summaries))?;
    if !recent.is_empty() {
        println!("recent_runs:");
        for s in recent {
            println!(
                "  - {} forms={} submitted={}",
                s.run_at, s.forms_processed, s.records_submitted
            );
        }
    }
    Ok(())
}

pub fn prune(table: &TableArgs) -> Result<usize> {
    let cfg = table.resolve(None)?;
    let store = CheckpointStore::open(&cfg.table)?;
    let removed = store.table().purge_expired(Utc::now().timestamp())?;
    println!("Removed {removed} expired item(s)");
    Ok(removed)
}
