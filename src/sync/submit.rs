use crate::clients::DestinationApi;
use crate::store::{Credentials, FormDefinition};
use crate::transform::{RawSubmission, normalize, to_destination};
use serde::Serialize;
use tracing::{debug, warn};

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted,
    Rejected { status: u16 },
    Failed { error: String },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedAt {
    pub submitted_at: i64,
    pub outcome: SubmitOutcome,
    pub unsent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitProgress {
    pub watermark_ms: i64,
    pub submitted: u64,
    pub stopped: Option<StoppedAt>,
}

pub fn submit_one(
    destination: &dyn DestinationApi,
    creds: &Credentials,
    topic_id: &str,
    raw: RawSubmission,
) -> SubmitOutcome {
    let payload = match normalize(raw)
        .and_then(|intake| to_destination(intake, &creds.destination_auth_key, topic_id))
    {
        Ok(payload) => payload,
        Err(err) => {
            return SubmitOutcome::Failed {
                error: err.to_string(),
            };
        }
    };
    match destination.submit(creds, &payload) {
        Ok(200 | 201) => SubmitOutcome::Accepted,
        Ok(status) => SubmitOutcome::Rejected { status },
        Err(err) => SubmitOutcome::Failed {
            error: format!("{err:#}"),
        },
    }
}

/// Delivers `candidates` (oldest first) one at a time and stops at the first
/// attempt that is not accepted. The watermark only moves over the accepted
/// prefix.
pub fn submit_in_order(
    destination: &dyn DestinationApi,
    creds: &Credentials,
    form: &FormDefinition,
    candidates: Vec<RawSubmission>,
    watermark_ms: i64,
) -> SubmitProgress {
    let total = candidates.len();
    let mut progress = SubmitProgress {
        watermark_ms,
        submitted: 0,
        stopped: None,
    };

    for raw in candidates {
        let submitted_at = raw.submitted_at;
        let outcome = submit_one(destination, creds, &form.topic_id, raw);
        if !outcome.is_accepted() {
            let unsent = total - progress.submitted as usize;
            warn!(
                form_id = %form.form_id,
                description = %form.description,
                submitted_at,
                ?outcome,
                "failed to submit {unsent} of {total} new submissions"
            );
            progress.stopped = Some(StoppedAt {
                submitted_at,
                outcome,
                unsent,
            });
            break;
        }
        progress.watermark_ms = progress.watermark_ms.max(submitted_at);
        progress.submitted += 1;
        debug!(form_id = %form.form_id, submitted_at, "submission accepted");
    }

    progress
}
