pub mod paginate;
mod pool;
pub mod submit;

use crate::clients::{DestinationApi, SourceApi};
use crate::config::{ConfigError, SyncConfig};
use crate::logging::ndjson;
use crate::store::checkpoints::CheckpointStore;
use crate::store::{Credentials, FormDefinition, RunCheckpoint, RunSummary};
use crate::transform::ms_to_utc_timestamp;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Everything a run needs besides the table contents.
pub struct SyncContext<'a> {
    pub cfg: &'a SyncConfig,
    pub source: &'a dyn SourceApi,
    pub destination: &'a dyn DestinationApi,
    pub ndjson_log: Option<&'a Path>,
}

/// Scheduler payload for a fan-out invocation covering one form.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    pub form: FormDefinition,
    pub creds: Credentials,
}

impl InvocationEvent {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read invocation event {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse invocation event {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub enum RunScope {
    AllForms,
    Form(String),
    Event(InvocationEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    /// Nothing newer than the watermark.
    UpToDate,
    Completed,
    /// Submission stopped at a rejected or failed record.
    Partial,
    /// Fetching from the source failed; nothing was submitted.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormOutcome {
    pub form_id: String,
    pub description: String,
    pub status: FormStatus,
    pub watermark_before: i64,
    pub watermark_after: i64,
    pub pages_fetched: usize,
    pub candidates: usize,
    pub submitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<submit::SubmitOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_at: String,
    pub forms_processed: u64,
    pub total_submitted: u64,
    pub forms: Vec<FormOutcome>,
}

/// Runs one sync pass: resolve credentials and forms, sync each form, then
/// record the run summary.
pub fn run_sync(ctx: &SyncContext, scope: RunScope) -> Result<RunReport> {
    // Without an invocation event the credentials come from the table, so a
    // missing table aborts before anything is created.
    let store = match &scope {
        RunScope::Event(_) => CheckpointStore::open(&ctx.cfg.table)?,
        _ => CheckpointStore::open_existing(&ctx.cfg.table)?
            .ok_or_else(|| missing_credentials(ctx.cfg))?,
    };
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("sync_run", %run_id);
    let _guard = span.enter();

    let (creds, forms) = match scope {
        RunScope::Event(event) => (event.creds, vec![event.form]),
        RunScope::AllForms => (load_credentials(&store, ctx.cfg)?, store.get_forms()?),
        RunScope::Form(form_id) => {
            let creds = load_credentials(&store, ctx.cfg)?;
            let form = store
                .get_form(&form_id)?
                .ok_or(ConfigError::UnknownForm(form_id))?;
            (creds, vec![form])
        }
    };
    let run_at = Utc::now();
    info!(forms = forms.len(), workers = ctx.cfg.workers, "sync run started");

    let outcomes = if ctx.cfg.workers > 1 && forms.len() > 1 {
        pool::sync_forms_pooled(ctx, &creds, &forms, ctx.cfg.workers)?
    } else {
        let mut outcomes = Vec::with_capacity(forms.len());
        for form in &forms {
            outcomes.push(sync_form(&store, ctx, &creds, form)?);
        }
        outcomes
    };

    let summary = build_summary(run_at, &outcomes, ctx.cfg.summary_ttl_days);
    store.put_summary(&summary)?;
    info!(
        forms = summary.forms_processed,
        submitted = summary.records_submitted,
        "sync run finished"
    );

    if let Some(path) = ctx.ndjson_log {
        for outcome in &outcomes {
            ndjson::mirror_form_outcome(path, &run_id, outcome)?;
        }
        ndjson::mirror_summary(path, &run_id, &summary)?;
    }

    Ok(RunReport {
        run_id,
        run_at: summary.run_at,
        forms_processed: summary.forms_processed,
        total_submitted: summary.records_submitted,
        forms: outcomes,
    })
}

fn load_credentials(store: &CheckpointStore, cfg: &SyncConfig) -> Result<Credentials> {
    let creds = store
        .get_credentials()?
        .ok_or_else(|| missing_credentials(cfg))?;
    Ok(creds)
}

fn missing_credentials(cfg: &SyncConfig) -> ConfigError {
    ConfigError::MissingCredentials(cfg.table.display().to_string())
}

pub fn build_summary(
    run_at: DateTime<Utc>,
    outcomes: &[FormOutcome],
    ttl_days: i64,
) -> RunSummary {
    RunSummary {
        run_at: run_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        forms_processed: outcomes.len() as u64,
        records_submitted: outcomes.iter().map(|o| o.submitted).sum(),
        expires_at: (run_at + Duration::days(ttl_days)).timestamp(),
    }
}

/// Syncs a single form. Source failures are folded into the outcome so the
/// remaining forms still run; store failures propagate.
pub fn sync_form(
    store: &CheckpointStore,
    ctx: &SyncContext,
    creds: &Credentials,
    form: &FormDefinition,
) -> Result<FormOutcome> {
    let span = info_span!("form", form_id = %form.form_id);
    let _guard = span.enter();

    let watermark = store
        .get_checkpoint(&form.form_id)?
        .map(|cp| cp.last_submitted_at_ms)
        .unwrap_or(0);
    let mut outcome = FormOutcome {
        form_id: form.form_id.clone(),
        description: form.description.clone(),
        status: FormStatus::UpToDate,
        watermark_before: watermark,
        watermark_after: watermark,
        pages_fetched: 0,
        candidates: 0,
        submitted: 0,
        stopped: None,
        error: None,
    };

    let fetched = match paginate::collect_new_submissions(
        ctx.source,
        creds,
        &form.form_id,
        watermark,
        ctx.cfg.page_size,
    ) {
        Ok(fetched) => fetched,
        Err(err) => {
            error!(description = %form.description, "fetch submissions failed: {err:#}");
            outcome.status = FormStatus::Failed;
            outcome.error = Some(format!("{err:#}"));
            return Ok(outcome);
        }
    };
    outcome.pages_fetched = fetched.pages;
    outcome.candidates = fetched.candidates.len();
    if fetched.candidates.is_empty() {
        info!(watermark, "form up to date");
        return Ok(outcome);
    }

    let mut candidates = fetched.candidates;
    candidates.reverse();
    // The source lists newest first; the stable sort only matters if it
    // ever returns pages out of order.
    candidates.sort_by_key(|c| c.submitted_at);

    let progress =
        submit::submit_in_order(ctx.destination, creds, form, candidates, watermark);
    outcome.submitted = progress.submitted;
    outcome.watermark_after = progress.watermark_ms;
    if let Some(stopped) = progress.stopped {
        outcome.status = FormStatus::Partial;
        outcome.stopped = Some(stopped.outcome);
    } else {
        outcome.status = FormStatus::Completed;
    }

    if progress.submitted > 0 {
        store.put_checkpoint(&RunCheckpoint {
            form_id: form.form_id.clone(),
            description: form.description.clone(),
            last_submitted_at_ms: progress.watermark_ms,
            last_submitted_at_iso: ms_to_utc_timestamp(progress.watermark_ms),
            submitted_count: progress.submitted,
        })?;
    } else {
        warn!(watermark, "no submissions delivered; checkpoint unchanged");
    }
    info!(
        submitted = progress.submitted,
        watermark = progress.watermark_ms,
        "form synced"
    );
    Ok(outcome)
}
