use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            id         TEXT PRIMARY KEY,  -- blake3 of the text
            text       TEXT NOT NULL,
            model      TEXT NOT NULL,
            embedding  BLOB NOT NULL,     -- little-endian f32
            stored_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_model ON records(model);
    ")?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Record the index dimension on first open; afterwards it must match.
pub fn ensure_dimensions(conn: &Connection, dimensions: usize) -> Result<usize> {
    match stored_dimensions(conn)? {
        Some(stored) if stored != dimensions => {
            bail!("index was created with {stored} dimensions, config asks for {dimensions}");
        }
        Some(stored) => Ok(stored),
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('dimensions', ?1)",
                params![dimensions.to_string()],
            )?;
            Ok(dimensions)
        }
    }
}

/// Dimension stored in an existing index, if any.
pub fn stored_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'dimensions'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    value
        .map(|v| v.parse::<usize>().with_context(|| format!("corrupt dimensions value {v:?}")))
        .transpose()
}
