pub mod checkpoints;
pub mod schema;
pub mod table;

use serde::{Deserialize, Serialize};

pub const FORM_PARTITION: &str = "hsform";
pub const CREDENTIALS_PARTITION: &str = "creds";
pub const CREDENTIALS_SORT_KEY: &str = "default";
pub const CHECKPOINT_PARTITION: &str = "lastrun";
pub const SUMMARY_PARTITION: &str = "runsummary";

/// Composite `(partition, sort)` key shared by every item in the table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: &str, sk: &str) -> Self {
        Self {
            pk: pk.to_string(),
            sk: sk.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormDefinition {
    #[serde(alias = "sk")]
    pub form_id: String,
    #[serde(alias = "desc")]
    pub description: String,
    pub topic_id: String,
}

/// Singleton holding both sides' endpoints and secrets. Aliases accept the
/// attribute names the scheduler payload uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(alias = "hskey")]
    pub source_api_key: String,
    #[serde(alias = "mcmauthkey")]
    pub destination_auth_key: String,
    #[serde(alias = "rylurl")]
    pub destination_url: String,
    #[serde(alias = "hsurl")]
    pub source_url_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCheckpoint {
    pub form_id: String,
    pub description: String,
    pub last_submitted_at_ms: i64,
    pub last_submitted_at_iso: String,
    pub submitted_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub run_at: String,
    pub forms_processed: u64,
    pub records_submitted: u64,
    /// Epoch seconds after which the item may be purged.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Form,
    Credentials,
    Checkpoint,
    Summary,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Credentials => "credentials",
            Self::Checkpoint => "checkpoint",
            Self::Summary => "summary",
        }
    }
}

/// Everything the table holds, discriminated by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreRecord {
    Form(FormDefinition),
    Credentials(Credentials),
    Checkpoint(RunCheckpoint),
    Summary(RunSummary),
}

impl StoreRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Form(_) => RecordKind::Form,
            Self::Credentials(_) => RecordKind::Credentials,
            Self::Checkpoint(_) => RecordKind::Checkpoint,
            Self::Summary(_) => RecordKind::Summary,
        }
    }

    pub fn key(&self) -> ItemKey {
        match self {
            Self::Form(f) => ItemKey::new(FORM_PARTITION, &f.form_id),
            Self::Credentials(_) => ItemKey::new(CREDENTIALS_PARTITION, CREDENTIALS_SORT_KEY),
            Self::Checkpoint(c) => ItemKey::new(CHECKPOINT_PARTITION, &c.form_id),
            Self::Summary(s) => ItemKey::new(SUMMARY_PARTITION, &s.run_at),
        }
    }

    /// Expiry stamp for the table's ttl column, if the kind carries one.
    pub fn ttl(&self) -> Option<i64> {
        match self {
            Self::Summary(s) => Some(s.expires_at),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_serialize_with_kind_tag() {
        let rec = StoreRecord::Checkpoint(RunCheckpoint {
            form_id: "f1".to_string(),
            description: "Contact us".to_string(),
            last_submitted_at_ms: 1200,
            last_submitted_at_iso: "1970-01-01T00:00:01Z".to_string(),
            submitted_count: 2,
        });
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["kind"], "checkpoint");
        assert_eq!(value["last_submitted_at_ms"], 1200);
        assert_eq!(rec.key(), ItemKey::new("lastrun", "f1"));
        assert_eq!(rec.ttl(), None);
    }

    #[test]
    fn credentials_accept_scheduler_attribute_names() {
        let creds: Credentials = serde_json::from_value(json!({
            "hskey": "hs-secret",
            "mcmauthkey": "auth",
            "rylurl": "https://intake.example/submit",
            "hsurl": "https://forms.example/submissions/"
        }))
        .unwrap();
        assert_eq!(creds.source_api_key, "hs-secret");
        assert_eq!(creds.destination_url, "https://intake.example/submit");
    }

    #[test]
    fn summary_key_and_ttl_follow_run_timestamp() {
        let rec = StoreRecord::Summary(RunSummary {
            run_at: "2026-10-19T12:00:00.000Z".to_string(),
            forms_processed: 3,
            records_submitted: 1,
            expires_at: 1_700_000_000,
        });
        assert_eq!(rec.kind(), RecordKind::Summary);
        assert_eq!(rec.key().pk, SUMMARY_PARTITION);
        assert_eq!(rec.ttl(), Some(1_700_000_000));
    }
}
