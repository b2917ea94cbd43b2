pub mod http;

use crate::store::Credentials;
use crate::transform::DestinationPayload;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

/// One page of form submissions. Records stay as raw JSON so malformed
/// entries can be skipped individually by the transformer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextPage {
    #[serde(default)]
    pub after: Option<String>,
}

impl SubmissionPage {
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .and_then(|n| n.after.as_deref())
            .filter(|after| !after.is_empty())
    }
}

pub trait SourceApi: Send + Sync {
    fn fetch_page(
        &self,
        creds: &Credentials,
        form_id: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<SubmissionPage>;
}

pub trait DestinationApi: Send + Sync {
    /// Posts one payload and returns the HTTP status code.
    fn submit(&self, creds: &Credentials, payload: &DestinationPayload) -> Result<u16>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_after_reads_nested_cursor() {
        let page: SubmissionPage = serde_json::from_value(json!({
            "results": [{"submittedAt": 1}],
            "paging": {"next": {"after": "abc", "link": "ignored"}}
        }))
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.next_after(), Some("abc"));
    }

    #[test]
    fn missing_or_empty_cursor_means_last_page() {
        let bare: SubmissionPage = serde_json::from_value(json!({})).unwrap();
        assert!(bare.results.is_empty());
        assert_eq!(bare.next_after(), None);

        let empty: SubmissionPage =
            serde_json::from_value(json!({"results": [], "paging": {"next": {"after": ""}}}))
                .unwrap();
        assert_eq!(empty.next_after(), None);
    }
}
