use crate::store::{ItemKey, StoreRecord, schema};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Sorted-key item table: `(pk, sk)` composite key, JSON attributes.
pub struct ItemTable {
    conn: Connection,
}

impl ItemTable {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create table parent dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite table {}", path.display()))?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Like `open`, but returns `None` instead of creating a missing file.
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        if !path
            .try_exists()
            .with_context(|| format!("stat sqlite table {}", path.display()))?
        {
            return Ok(None);
        }
        Self::open(path).map(Some)
    }

    pub fn get(&self, key: &ItemKey) -> Result<Option<StoreRecord>> {
        let attrs = self
            .conn
            .query_row(
                "SELECT attrs_json FROM items WHERE pk = ?1 AND sk = ?2",
                params![key.pk, key.sk],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("get item {}/{}", key.pk, key.sk))?;
        attrs.map(|raw| decode(&raw, key)).transpose()
    }

    pub fn query(
        &self,
        pk: &str,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<StoreRecord>> {
        let sql = match order {
            ScanOrder::Ascending => {
                "SELECT sk, attrs_json FROM items WHERE pk = ?1 ORDER BY sk ASC LIMIT ?2"
            }
            ScanOrder::Descending => {
                "SELECT sk, attrs_json FROM items WHERE pk = ?1 ORDER BY sk DESC LIMIT ?2"
            }
        };
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![pk, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("query partition {pk}"))?;
        rows.into_iter()
            .map(|(sk, raw)| decode(&raw, &ItemKey::new(pk, &sk)))
            .collect()
    }

    pub fn put(&self, record: &StoreRecord) -> Result<()> {
        upsert(&self.conn, record)
    }

    pub fn batch_put(&self, records: &[StoreRecord]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            upsert(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn purge_expired(&self, now_epoch_secs: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM items WHERE ttl IS NOT NULL AND ttl <= ?1",
                params![now_epoch_secs],
            )
            .context("purge expired items")?;
        Ok(removed)
    }
}

fn upsert(conn: &Connection, record: &StoreRecord) -> Result<()> {
    let key = record.key();
    let attrs = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO items (pk, sk, kind, attrs_json, ttl, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(pk, sk) DO UPDATE SET
            kind = excluded.kind,
            attrs_json = excluded.attrs_json,
            ttl = excluded.ttl,
            updated_at = excluded.updated_at",
        params![
            key.pk,
            key.sk,
            record.kind().as_str(),
            attrs,
            record.ttl(),
            Utc::now().to_rfc3339()
        ],
    )
    .with_context(|| format!("put item {}/{}", key.pk, key.sk))?;
    Ok(())
}

fn decode(raw: &str, key: &ItemKey) -> Result<StoreRecord> {
    serde_json::from_str(raw).with_context(|| format!("decode item {}/{}", key.pk, key.sk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FormDefinition, RunSummary};
    use tempfile::tempdir;

    fn form(id: &str) -> StoreRecord {
        StoreRecord::Form(FormDefinition {
            form_id: id.to_string(),
            description: format!("form {id}"),
            topic_id: "t-1".to_string(),
        })
    }

    #[test]
    fn query_orders_and_limits_by_sort_key() {
        let tmp = tempdir().unwrap();
        let table = ItemTable::open(&tmp.path().join("items.db")).unwrap();
        table.batch_put(&[form("b"), form("a"), form("c")]).unwrap();

        let asc = table.query("hsform", ScanOrder::Ascending, None).unwrap();
        let ids: Vec<_> = asc.iter().map(|r| r.key().sk).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let desc = table
            .query("hsform", ScanOrder::Descending, Some(2))
            .unwrap();
        let ids: Vec<_> = desc.iter().map(|r| r.key().sk).collect();
        assert_eq!(ids, vec!["c", "b"]);

        assert!(table.query("lastrun", ScanOrder::Ascending, None).unwrap().is_empty());
    }

    #[test]
    fn put_overwrites_existing_item() {
        let tmp = tempdir().unwrap();
        let table = ItemTable::open(&tmp.path().join("items.db")).unwrap();
        table.put(&form("a")).unwrap();
        table
            .put(&StoreRecord::Form(FormDefinition {
                form_id: "a".to_string(),
                description: "renamed".to_string(),
                topic_id: "t-2".to_string(),
            }))
            .unwrap();

        match table.get(&ItemKey::new("hsform", "a")).unwrap() {
            Some(StoreRecord::Form(f)) => {
                assert_eq!(f.description, "renamed");
                assert_eq!(f.topic_id, "t-2");
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(table.get(&ItemKey::new("hsform", "zz")).unwrap().is_none());
    }

    #[test]
    fn purge_removes_only_expired_items() {
        let tmp = tempdir().unwrap();
        let table = ItemTable::open(&tmp.path().join("items.db")).unwrap();
        let summary = |run_at: &str, expires_at: i64| {
            StoreRecord::Summary(RunSummary {
                run_at: run_at.to_string(),
                forms_processed: 1,
                records_submitted: 0,
                expires_at,
            })
        };
        table
            .batch_put(&[summary("r1", 100), summary("r2", 500), form("a")])
            .unwrap();

        assert_eq!(table.purge_expired(200).unwrap(), 1);
        let left = table.query("runsummary", ScanOrder::Ascending, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key().sk, "r2");
        assert!(table.get(&ItemKey::new("hsform", "a")).unwrap().is_some());
    }

    #[test]
    fn open_existing_does_not_create_missing_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("items.db");
        assert!(ItemTable::open_existing(&path).unwrap().is_none());
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());

        ItemTable::open(&path).unwrap().put(&form("a")).unwrap();
        let table = ItemTable::open_existing(&path).unwrap().unwrap();
        assert!(table.get(&ItemKey::new("hsform", "a")).unwrap().is_some());
    }
}
