//! Pure mapping from source form submissions to destination intake payloads.

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const REQUIRED_FIELDS: [&str; 4] = ["firstname", "lastname", "email", "phone"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("submission is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("encode extra fields: {0}")]
    EncodeExtra(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSubmission {
    pub submitted_at: i64,
    pub page_url: Option<String>,
    /// Field name/value pairs in source order.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedIntake {
    pub submitted_at: i64,
    pub page_url: Option<String>,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    pub mobilephone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub company: String,
    pub extra: BTreeMap<String, String>,
}

/// Form-encoded body posted to the intake endpoint. Every field is always
/// present; missing values are empty strings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DestinationPayload {
    pub mcmauthkey: String,
    pub campaigntopicid: String,
    pub firstname: String,
    pub lastname: String,
    pub emailaddress: String,
    pub phonehome: String,
    pub phonecell: String,
    pub address1: String,
    pub city: String,
    pub state: String,
    pub businessname: String,
    pub comments: String,
}

/// Extracts one page record. Returns `None` for records that are not yet a
/// submission from this run's point of view: no usable `submittedAt`, a
/// `submittedAt` at or before the watermark, or malformed `values`.
pub fn parse_raw(record: &Value, watermark_ms: i64) -> Option<RawSubmission> {
    let submitted_at = record.get("submittedAt").and_then(epoch_ms)?;
    if submitted_at <= watermark_ms {
        return None;
    }
    let page_url = record
        .get("pageUrl")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let mut fields = Vec::new();
    if let Some(values) = record.get("values") {
        for entry in values.as_array()? {
            let name = entry.get("name")?.as_str()?;
            let value = match entry.get("value")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            fields.push((name.to_string(), value));
        }
    }

    Some(RawSubmission {
        submitted_at,
        page_url,
        fields,
    })
}

fn epoch_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn normalize(raw: RawSubmission) -> Result<NormalizedIntake, TransformError> {
    for name in REQUIRED_FIELDS {
        if !raw.fields.iter().any(|(field, _)| field == name) {
            return Err(TransformError::MissingField(name));
        }
    }

    let mut intake = NormalizedIntake {
        submitted_at: raw.submitted_at,
        page_url: raw.page_url,
        ..NormalizedIntake::default()
    };
    // Later duplicates overwrite earlier ones, for known and extra fields alike.
    for (name, value) in raw.fields {
        let slot = match name.as_str() {
            "firstname" => &mut intake.firstname,
            "lastname" => &mut intake.lastname,
            "email" => &mut intake.email,
            "phone" => &mut intake.phone,
            "mobilephone" => &mut intake.mobilephone,
            "address" => &mut intake.address,
            "city" => &mut intake.city,
            "state" => &mut intake.state,
            "company" => &mut intake.company,
            _ => {
                intake.extra.insert(extra_field_name(&name), value);
                continue;
            }
        };
        *slot = value;
    }
    Ok(intake)
}

pub fn extra_field_name(name: &str) -> String {
    name.replace('_', " ").trim().to_string()
}

pub fn to_destination(
    intake: NormalizedIntake,
    auth_key: &str,
    topic_id: &str,
) -> Result<DestinationPayload, TransformError> {
    let comments = if intake.extra.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&intake.extra)
            .map_err(|e| TransformError::EncodeExtra(e.to_string()))?
    };

    Ok(DestinationPayload {
        mcmauthkey: auth_key.to_string(),
        campaigntopicid: topic_id.to_string(),
        firstname: intake.firstname,
        lastname: intake.lastname,
        emailaddress: intake.email,
        phonehome: intake.phone,
        phonecell: intake.mobilephone,
        address1: intake.address,
        city: intake.city,
        state: intake.state,
        businessname: intake.company,
        comments,
    })
}

/// `YYYY-MM-DDTHH:MM:SSZ`, truncated to the second.
pub fn ms_to_utc_timestamp(ms: i64) -> String {
    DateTime::from_timestamp(ms.div_euclid(1000), 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}
