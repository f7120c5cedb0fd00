//! Save, search and compare texts through an injected embedder and store.

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::embed::Embedder;
use crate::similarity::{self, SimilarityError, SimilarityScore};
use crate::store::{self, VectorStore};

/// Sentences the `demo` command seeds the index with.
pub const SAMPLE_TEXTS: [&str; 3] = [
    "I love eating fresh green apples.",
    "The server is currently undergoing maintenance.",
    "Python is a popular language for data science.",
];

pub struct SaveOutcome {
    pub id: String,
    /// True when a record with the same text already existed.
    pub replaced: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: SimilarityScore,
    pub check: Option<CrossCheck>,
}

/// Store-reported score recomputed locally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CrossCheck {
    Computed {
        local: SimilarityScore,
        delta: f64,
    },
    Undefined,
}

impl CrossCheck {
    fn compute(query: &[f32], stored: &[f32], reported: SimilarityScore) -> Result<Self> {
        match similarity::cosine_similarity(query, stored) {
            Ok(local) => Ok(Self::Computed {
                local,
                delta: (local - reported).abs(),
            }),
            Err(SimilarityError::DegenerateVector) => Ok(Self::Undefined),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn save_text(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    text: &str,
) -> Result<SaveOutcome> {
    let embedding = embedder
        .embed(text)
        .with_context(|| format!("embedding {text:?}"))?;
    let id = store::record_id(text);
    let replaced = store.get(&id)?.is_some();
    store.upsert(&id, text, &embedding, embedder.model_name())?;
    tracing::info!(%id, replaced, model = embedder.model_name(), "saved text");
    Ok(SaveOutcome { id, replaced })
}

/// Embed `query` and return its nearest stored texts, best first. With
/// `verify`, each hit carries a local recomputation of its score.
pub fn search(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    top_k: usize,
    verify: bool,
) -> Result<Vec<SearchHit>> {
    let query_vector = embedder
        .embed(query)
        .with_context(|| format!("embedding query {query:?}"))?;
    let matches = store.query(&query_vector, top_k)?;
    tracing::debug!(query, hits = matches.len(), "search complete");

    matches
        .into_iter()
        .map(|m| -> Result<SearchHit> {
            let check = if verify {
                Some(CrossCheck::compute(&query_vector, &m.embedding, m.score)?)
            } else {
                None
            };
            Ok(SearchHit {
                id: m.id,
                text: m.text,
                score: m.score,
                check,
            })
        })
        .collect()
}

/// Cosine similarity of two texts, without touching the store.
pub fn compare_texts(embedder: &dyn Embedder, a: &str, b: &str) -> Result<SimilarityScore> {
    let vectors = embedder.embed_batch(&[a, b])?;
    let [va, vb] = vectors.as_slice() else {
        bail!("embedder returned {} vectors for 2 texts", vectors.len());
    };
    Ok(similarity::cosine_similarity(va, vb)?)
}
