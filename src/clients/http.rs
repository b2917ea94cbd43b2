use crate::clients::{DestinationApi, SourceApi, SubmissionPage};
use crate::store::Credentials;
use crate::transform::DestinationPayload;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use reqwest::blocking::{Client, Request};
use std::time::Duration;
use tracing::debug;

/// Blocking client for both the forms API and the intake endpoint.
pub struct HttpClients {
    client: Client,
}

impl HttpClients {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }

    /// Builds the page request; `form_id` and the cursor are encoded.
    pub fn submissions_request(
        &self,
        creds: &Credentials,
        form_id: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<Request> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.client
            .get(submissions_url(&creds.source_url_base, form_id)?)
            .query(&query)
            .bearer_auth(&creds.source_api_key)
            .build()
            .with_context(|| format!("build submissions request for form {form_id}"))
    }
}

pub fn submissions_url(base: &str, form_id: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("parse source url base {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("source url base {base} cannot carry a path"))?
        .pop_if_empty()
        .push(form_id);
    Ok(url)
}

impl SourceApi for HttpClients {
    fn fetch_page(
        &self,
        creds: &Credentials,
        form_id: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<SubmissionPage> {
        let request = self.submissions_request(creds, form_id, limit, after)?;
        debug!(%form_id, after = after.unwrap_or(""), "fetching submissions page");
        let resp = self
            .client
            .execute(request)
            .with_context(|| format!("fetch submissions for form {form_id}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("source api returned {status} for form {form_id}");
        }
        resp.json::<SubmissionPage>()
            .with_context(|| format!("decode submissions page for form {form_id}"))
    }
}

impl DestinationApi for HttpClients {
    fn submit(&self, creds: &Credentials, payload: &DestinationPayload) -> Result<u16> {
        let resp = self
            .client
            .post(&creds.destination_url)
            .form(payload)
            .send()
            .context("post intake payload")?;
        Ok(resp.status().as_u16())
    }
}
