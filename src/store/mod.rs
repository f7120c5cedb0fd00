pub mod schema;
pub mod sqlite;

use anyhow::Result;
use serde::Serialize;

use crate::embed::Embedding;
use crate::similarity::SimilarityScore;

/// A stored vector returned by a nearest-neighbour query.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub id: String,
    pub text: String,
    pub score: SimilarityScore,
    #[serde(skip)]
    pub embedding: Embedding,
}

/// A record as stored in the index.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub model: String,
    #[serde(skip)]
    pub embedding: Embedding,
    pub stored_at: String,
}

/// Persistence and nearest-neighbour lookup for embeddings.
pub trait VectorStore {
    /// Insert or replace the record with this id.
    fn upsert(&self, id: &str, text: &str, embedding: &[f32], model: &str) -> Result<()>;
    /// Top `top_k` records by cosine similarity, best first.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>>;
    fn get(&self, id: &str) -> Result<Option<Record>>;
    fn count(&self) -> Result<usize>;
}

/// Content-addressed record id.
pub fn record_id(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
