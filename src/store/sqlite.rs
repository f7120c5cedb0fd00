use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::Path;

use super::{Match, Record, VectorStore, schema};
use crate::embed::Embedding;
use crate::similarity::{self, SimilarityError};

const DB_FILE: &str = "index.db";

/// Local vector store. Queries are an exact scan over every record.
pub struct SqliteStore {
    conn: Connection,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub record_count: i64,
    pub dimensions: usize,
    pub db_size_bytes: u64,
    pub models: Vec<(String, i64)>,
}

impl SqliteStore {
    pub fn open(storage_dir: &Path, dimensions: usize) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)
            .with_context(|| format!("creating storage dir {}", storage_dir.display()))?;
        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        Self::from_connection(conn, dimensions)
    }

    /// Open only if the database already exists.
    pub fn open_if_exists(storage_dir: &Path, dimensions: usize) -> Result<Option<Self>> {
        if !storage_dir.join(DB_FILE).exists() {
            return Ok(None);
        }
        Self::open(storage_dir, dimensions).map(Some)
    }

    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, dimensions)
    }

    fn from_connection(conn: Connection, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            bail!("index dimensions must be greater than zero");
        }
        schema::run_migrations(&conn)?;
        let dimensions = schema::ensure_dimensions(&conn, dimensions)?;
        Ok(Self { conn, dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, len: usize, what: &str) -> Result<()> {
        if len != self.dimensions {
            bail!(
                "{what} has {len} dimensions, index expects {}",
                self.dimensions
            );
        }
        Ok(())
    }

    pub fn stats(&self, storage_dir: &Path) -> Result<StoreStats> {
        let record_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;

        let db_size_bytes = std::fs::metadata(storage_dir.join(DB_FILE))
            .map(|m| m.len())
            .unwrap_or(0);

        let mut stmt = self.conn.prepare(
            "SELECT model, COUNT(*) FROM records GROUP BY model ORDER BY COUNT(*) DESC, model",
        )?;
        let models = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        Ok(StoreStats {
            record_count,
            dimensions: self.dimensions,
            db_size_bytes,
            models,
        })
    }
}

impl VectorStore for SqliteStore {
    fn upsert(&self, id: &str, text: &str, embedding: &[f32], model: &str) -> Result<()> {
        self.check_dimensions(embedding.len(), "embedding")?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO records (id, text, model, embedding, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                model = excluded.model,
                embedding = excluded.embedding,
                stored_at = excluded.stored_at",
            params![id, text, model, encode_embedding(embedding), now],
        )?;
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.check_dimensions(vector.len(), "query vector")?;
        if similarity::l2_norm(vector)? == 0.0 {
            return Err(SimilarityError::DegenerateVector.into());
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, text, embedding FROM records")?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, blob))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (id, text, blob) = row?;
            let embedding = decode_embedding(&blob);
            let score = match similarity::cosine_similarity(vector, &embedding) {
                Ok(s) => s,
                Err(SimilarityError::DegenerateVector) => {
                    tracing::warn!(%id, "skipping zero vector");
                    continue;
                }
                Err(e) => return Err(anyhow::Error::new(e).context(format!("scoring record {id}"))),
            };
            matches.push(Match {
                id,
                text,
                score,
                embedding,
            });
        }

        rank(&mut matches);
        matches.truncate(top_k);
        tracing::debug!(returned = matches.len(), top_k, "query complete");
        Ok(matches)
    }

    fn get(&self, id: &str) -> Result<Option<Record>> {
        self.conn
            .query_row(
                "SELECT id, text, model, embedding, stored_at FROM records WHERE id = ?1",
                params![id],
                |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok(Record {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        model: row.get(2)?,
                        embedding: decode_embedding(&blob),
                        stored_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

/// Best score first, ties by id. Total order, so the result is deterministic
/// even if a score is NaN.
fn rank(matches: &mut [Match]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Embedding {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(3).unwrap()
    }

    #[test]
    fn upsert_and_get() {
        let s = store();
        s.upsert("a", "apples", &[0.25, -1.5, 3.0], "m").unwrap();
        let rec = s.get("a").unwrap().unwrap();
        assert_eq!(rec.text, "apples");
        assert_eq!(rec.model, "m");
        assert_eq!(rec.embedding, vec![0.25, -1.5, 3.0]);
        assert!(s.get("missing").unwrap().is_none());
    }

    #[test]
    fn upsert_same_id_overwrites() {
        let s = store();
        s.upsert("a", "first", &[1.0, 0.0, 0.0], "m").unwrap();
        s.upsert("a", "second", &[0.0, 1.0, 0.0], "m").unwrap();
        assert_eq!(s.count().unwrap(), 1);
        assert_eq!(s.get("a").unwrap().unwrap().text, "second");
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let s = store();
        let err = s.upsert("a", "x", &[1.0, 0.0], "m").unwrap_err();
        assert!(err.to_string().contains("index expects 3"));
        assert!(s.query(&[1.0, 0.0, 0.0, 0.0], 3).is_err());
    }

    #[test]
    fn query_orders_by_score() {
        let s = store();
        s.upsert("x", "x axis", &[1.0, 0.0, 0.0], "m").unwrap();
        s.upsert("y", "y axis", &[0.0, 1.0, 0.0], "m").unwrap();
        s.upsert("xy", "diagonal", &[1.0, 1.0, 0.0], "m").unwrap();
        s.upsert("neg", "minus x", &[-1.0, 0.0, 0.0], "m").unwrap();

        let hits = s.query(&[1.0, 0.1, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy", "y"]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn ties_break_by_id() {
        let s = store();
        s.upsert("b", "b", &[2.0, 0.0, 0.0], "m").unwrap();
        s.upsert("a", "a", &[1.0, 0.0, 0.0], "m").unwrap();
        let hits = s.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
    }

    #[test]
    fn rank_is_total_with_nan() {
        let m = |id: &str, score: f64| Match {
            id: id.to_string(),
            text: String::new(),
            score,
            embedding: Vec::new(),
        };
        let mut a = vec![m("a", 0.5), m("n", f64::NAN), m("c", 0.9), m("b", 0.5)];
        let mut b = vec![m("b", 0.5), m("c", 0.9), m("a", 0.5), m("n", f64::NAN)];
        rank(&mut a);
        rank(&mut b);
        let ids = |v: &[Match]| v.iter().map(|x| x.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a)[1..], ["c", "a", "b"]);
    }

    #[test]
    fn zero_vectors_are_skipped() {
        let s = store();
        s.upsert("zero", "nothing", &[0.0, 0.0, 0.0], "m").unwrap();
        s.upsert("x", "x axis", &[1.0, 0.0, 0.0], "m").unwrap();
        let hits = s.query(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "x");
    }

    #[test]
    fn zero_query_is_degenerate() {
        let s = store();
        s.upsert("x", "x axis", &[1.0, 0.0, 0.0], "m").unwrap();
        let err = s.query(&[0.0, 0.0, 0.0], 5).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SimilarityError>(),
            Some(&SimilarityError::DegenerateVector)
        );
    }

    #[test]
    fn empty_store_returns_nothing() {
        let s = store();
        assert!(s.query(&[1.0, 0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn dimensions_fixed_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let s = SqliteStore::open(dir.path(), 3).unwrap();
            s.upsert("a", "a", &[1.0, 2.0, 3.0], "m").unwrap();
        }
        let err = SqliteStore::open(dir.path(), 4).err().unwrap();
        assert!(err.to_string().contains("created with 3"));

        let s = SqliteStore::open_if_exists(dir.path(), 3).unwrap().unwrap();
        let stats = s.stats(dir.path()).unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.dimensions, 3);
        assert_eq!(stats.models, vec![("m".to_string(), 1)]);
        assert!(stats.db_size_bytes > 0);
    }

    #[test]
    fn open_if_exists_without_db() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteStore::open_if_exists(dir.path(), 3).unwrap().is_none());
    }

    #[test]
    fn blob_encoding_is_exact() {
        let v = vec![f32::MIN_POSITIVE, -0.0, 1.0e-7, 12345.678];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }
}
