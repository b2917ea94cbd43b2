use crate::store::table::{ItemTable, ScanOrder};
use crate::store::{
    CHECKPOINT_PARTITION, CREDENTIALS_PARTITION, CREDENTIALS_SORT_KEY, Credentials, FORM_PARTITION,
    FormDefinition, ItemKey, RunCheckpoint, RunSummary, SUMMARY_PARTITION, StoreRecord,
};
use anyhow::{Result, bail};
use std::path::Path;

/// Typed view over the item table used by the sync core and the
/// provisioning commands.
pub struct CheckpointStore {
    table: ItemTable,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            table: ItemTable::open(path)?,
        })
    }

    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        Ok(ItemTable::open_existing(path)?.map(|table| Self { table }))
    }

    pub fn table(&self) -> &ItemTable {
        &self.table
    }

    /// All form definitions, newest sort key first. Callers must not depend
    /// on the order.
    pub fn get_forms(&self) -> Result<Vec<FormDefinition>> {
        self.table
            .query(FORM_PARTITION, ScanOrder::Descending, None)?
            .into_iter()
            .map(|rec| match rec {
                StoreRecord::Form(form) => Ok(form),
                other => bail!(
                    "unexpected {} item in form partition",
                    other.kind().as_str()
                ),
            })
            .collect()
    }

    pub fn get_form(&self, form_id: &str) -> Result<Option<FormDefinition>> {
        match self.table.get(&ItemKey::new(FORM_PARTITION, form_id))? {
            None => Ok(None),
            Some(StoreRecord::Form(form)) => Ok(Some(form)),
            Some(other) => bail!("unexpected {} item for form {form_id}", other.kind().as_str()),
        }
    }

    pub fn put_form(&self, form: &FormDefinition) -> Result<()> {
        self.table.put(&StoreRecord::Form(form.clone()))
    }

    pub fn get_credentials(&self) -> Result<Option<Credentials>> {
        match self
            .table
            .get(&ItemKey::new(CREDENTIALS_PARTITION, CREDENTIALS_SORT_KEY))?
        {
            None => Ok(None),
            Some(StoreRecord::Credentials(creds)) => Ok(Some(creds)),
            Some(other) => bail!("unexpected {} item at credentials key", other.kind().as_str()),
        }
    }

    pub fn put_credentials(&self, creds: &Credentials) -> Result<()> {
        self.table.put(&StoreRecord::Credentials(creds.clone()))
    }

    pub fn get_checkpoint(&self, form_id: &str) -> Result<Option<RunCheckpoint>> {
        match self.table.get(&ItemKey::new(CHECKPOINT_PARTITION, form_id))? {
            None => Ok(None),
            Some(StoreRecord::Checkpoint(cp)) => Ok(Some(cp)),
            Some(other) => bail!(
                "unexpected {} item for checkpoint {form_id}",
                other.kind().as_str()
            ),
        }
    }

    pub fn put_checkpoint(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        self.table.put(&StoreRecord::Checkpoint(checkpoint.clone()))
    }

    pub fn put_summary(&self, summary: &RunSummary) -> Result<()> {
        self.table.put(&StoreRecord::Summary(summary.clone()))
    }

    /// Most recent run summaries first.
    pub fn list_summaries(&self, limit: Option<usize>) -> Result<Vec<RunSummary>> {
        self.table
            .query(SUMMARY_PARTITION, ScanOrder::Descending, limit)?
            .into_iter()
            .map(|rec| match rec {
                StoreRecord::Summary(s) => Ok(s),
                other => bail!(
                    "unexpected {} item in summary partition",
                    other.kind().as_str()
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_items_read_as_absent() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::open(&tmp.path().join("state.db")).unwrap();
        assert!(store.get_credentials().unwrap().is_none());
        assert!(store.get_checkpoint("f1").unwrap().is_none());
        assert!(store.get_forms().unwrap().is_empty());
        assert!(store.list_summaries(None).unwrap().is_empty());
    }

    #[test]
    fn checkpoint_upsert_replaces_previous_value() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::open(&tmp.path().join("state.db")).unwrap();
        let mut cp = RunCheckpoint {
            form_id: "f1".to_string(),
            description: "Contact".to_string(),
            last_submitted_at_ms: 1000,
            last_submitted_at_iso: "1970-01-01T00:00:01Z".to_string(),
            submitted_count: 1,
        };
        store.put_checkpoint(&cp).unwrap();
        cp.last_submitted_at_ms = 2000;
        cp.submitted_count = 4;
        store.put_checkpoint(&cp).unwrap();

        let stored = store.get_checkpoint("f1").unwrap().unwrap();
        assert_eq!(stored.last_submitted_at_ms, 2000);
        assert_eq!(stored.submitted_count, 4);
    }

    #[test]
    fn summaries_accumulate_newest_first() {
        let tmp = tempdir().unwrap();
        let store = CheckpointStore::open(&tmp.path().join("state.db")).unwrap();
        for (run_at, n) in [("2026-01-01T00:00:00.000Z", 1), ("2026-01-02T00:00:00.000Z", 2)] {
            store
                .put_summary(&RunSummary {
                    run_at: run_at.to_string(),
                    forms_processed: 2,
                    records_submitted: n,
                    expires_at: 0,
                })
                .unwrap();
        }
        let all = store.list_summaries(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].records_submitted, 2);
        assert_eq!(store.list_summaries(Some(1)).unwrap().len(), 1);
    }
}
