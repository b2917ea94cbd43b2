use crate::store::RunSummary;
use crate::sync::FormOutcome;
use anyhow::Result;
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub fn mirror_form_outcome(path: &Path, run_id: &str, outcome: &FormOutcome) -> Result<()> {
    append_line(
        path,
        json!({
            "run_id": run_id,
            "event": "form_synced",
            "form": outcome.form_id,
            "status": outcome.status,
            "watermark": outcome.watermark_after,
            "submitted": outcome.submitted,
            "candidates": outcome.candidates,
            "error": outcome.error
        }),
    )
}

pub fn mirror_summary(path: &Path, run_id: &str, summary: &RunSummary) -> Result<()> {
    append_line(
        path,
        json!({
            "run_id": run_id,
            "event": "run_summarized",
            "ts": summary.run_at,
            "forms": summary.forms_processed,
            "submitted": summary.records_submitted,
            "expires_at": summary.expires_at
        }),
    )
}

fn append_line(path: &Path, line: Value) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", line)?;
    Ok(())
}
