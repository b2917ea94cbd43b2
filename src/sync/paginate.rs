use crate::clients::SourceApi;
use crate::store::Credentials;
use crate::transform::{RawSubmission, parse_raw};
use anyhow::{Result, bail};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct FetchedSubmissions {
    /// Newest first, in the order the source returned them.
    pub candidates: Vec<RawSubmission>,
    pub pages: usize,
}

/// Walks the form's submission pages until the watermark is reached or the
/// source reports its last page.
pub fn collect_new_submissions(
    source: &dyn SourceApi,
    creds: &Credentials,
    form_id: &str,
    watermark_ms: i64,
    page_size: usize,
) -> Result<FetchedSubmissions> {
    let mut fetched = FetchedSubmissions::default();
    let mut after: Option<String> = None;

    loop {
        let page = source.fetch_page(creds, form_id, page_size, after.as_deref())?;
        fetched.pages += 1;

        let raw_count = page.results.len();
        let kept: Vec<RawSubmission> = page
            .results
            .iter()
            .filter_map(|record| parse_raw(record, watermark_ms))
            .collect();
        debug!(
            %form_id,
            page = fetched.pages,
            raw = raw_count,
            kept = kept.len(),
            "filtered submissions page"
        );

        // Nothing newer than the watermark on this page: caught up.
        if kept.is_empty() {
            break;
        }
        fetched.candidates.extend(kept);

        // A short page from the source is its last one. Records dropped by
        // the filter do not shorten the page.
        let next = match page.next_after() {
            Some(next) if raw_count >= page_size => next.to_string(),
            _ => break,
        };
        if after.as_deref() == Some(next.as_str()) {
            bail!("source api repeated page cursor {next} for form {form_id}");
        }
        after = Some(next);
    }

    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::SubmissionPage;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct ScriptedSource {
        pages: Mutex<Vec<Value>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Value>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().rev().collect()),
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    impl SourceApi for ScriptedSource {
        fn fetch_page(
            &self,
            _creds: &Credentials,
            _form_id: &str,
            _limit: usize,
            after: Option<&str>,
        ) -> Result<SubmissionPage> {
            self.cursors.lock().unwrap().push(after.map(String::from));
            let page = self.pages.lock().unwrap().pop().unwrap_or(json!({}));
            Ok(serde_json::from_value(page)?)
        }
    }

    fn creds() -> Credentials {
        Credentials {
            source_api_key: "k".to_string(),
            destination_auth_key: "a".to_string(),
            destination_url: "http://dest".to_string(),
            source_url_base: "http://src/".to_string(),
        }
    }

    fn records(times: &[i64]) -> Vec<Value> {
        times
            .iter()
            .map(|t| json!({"submittedAt": t, "values": []}))
            .collect()
    }

    #[test]
    fn stops_when_page_has_nothing_newer() {
        let source = ScriptedSource::new(vec![
            json!({"results": records(&[900, 800]), "paging": {"next": {"after": "p2"}}}),
        ]);
        let fetched = collect_new_submissions(&source, &creds(), "f", 1000, 2).unwrap();
        assert!(fetched.candidates.is_empty());
        assert_eq!(fetched.pages, 1);
    }

    #[test]
    fn follows_cursor_until_short_page() {
        let source = ScriptedSource::new(vec![
            json!({"results": records(&[60, 50]), "paging": {"next": {"after": "p2"}}}),
            json!({"results": records(&[40, 30]), "paging": {"next": {"after": "p3"}}}),
            json!({"results": records(&[20]), "paging": {"next": {"after": "p4"}}}),
        ]);
        let fetched = collect_new_submissions(&source, &creds(), "f", 0, 2).unwrap();
        let times: Vec<_> = fetched.candidates.iter().map(|c| c.submitted_at).collect();
        assert_eq!(times, vec![60, 50, 40, 30, 20]);
        assert_eq!(fetched.pages, 3);
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
    }

    #[test]
    fn page_reaching_watermark_is_followed_until_nothing_is_kept() {
        let source = ScriptedSource::new(vec![
            json!({"results": records(&[40, 30]), "paging": {"next": {"after": "p2"}}}),
            json!({"results": records(&[20, 10]), "paging": {"next": {"after": "p3"}}}),
        ]);
        let fetched = collect_new_submissions(&source, &creds(), "f", 30, 2).unwrap();
        let times: Vec<_> = fetched.candidates.iter().map(|c| c.submitted_at).collect();
        assert_eq!(times, vec![40]);
        assert_eq!(fetched.pages, 2);
    }

    #[test]
    fn record_without_timestamp_does_not_shorten_a_full_page() {
        let mut first: Vec<Value> = records(&(2..=20).rev().collect::<Vec<_>>());
        first.insert(5, json!({"values": []}));
        assert_eq!(first.len(), 20);
        let source = ScriptedSource::new(vec![
            json!({"results": first, "paging": {"next": {"after": "p2"}}}),
            json!({"results": records(&[1])}),
        ]);
        let fetched = collect_new_submissions(&source, &creds(), "f", 0, 20).unwrap();
        assert_eq!(fetched.pages, 2);
        assert_eq!(fetched.candidates.len(), 20);
        assert_eq!(fetched.candidates.last().map(|c| c.submitted_at), Some(1));
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("p2".to_string())]
        );
    }

    #[test]
    fn partial_page_keeps_only_newer_records() {
        let source = ScriptedSource::new(vec![
            json!({"results": records(&[1200, 1100, 900])}),
        ]);
        let fetched = collect_new_submissions(&source, &creds(), "f", 1000, 20).unwrap();
        let times: Vec<_> = fetched.candidates.iter().map(|c| c.submitted_at).collect();
        assert_eq!(times, vec![1200, 1100]);
    }

    #[test]
    fn repeated_cursor_is_an_error() {
        let source = ScriptedSource::new(vec![
            json!({"results": records(&[4, 3]), "paging": {"next": {"after": "same"}}}),
            json!({"results": records(&[2, 1]), "paging": {"next": {"after": "same"}}}),
        ]);
        let err = collect_new_submissions(&source, &creds(), "f", 0, 2).unwrap_err();
        assert!(format!("{err}").contains("repeated page cursor"));
    }
}
