use rusqlite::{Connection, Result};

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('form','credentials','checkpoint','summary')),
            attrs_json TEXT NOT NULL,
            ttl INTEGER,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(pk, sk)
        ) WITHOUT ROWID;

        CREATE INDEX IF NOT EXISTS idx_items_ttl ON items(ttl) WHERE ttl IS NOT NULL;
        ",
    )?;

    Ok(())
}
