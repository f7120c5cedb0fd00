use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{Embedder, Embedding, prepare_input};

pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let mut embedder = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions: 0,
        };

        // Probe dimensions with a short test string
        let test = embedder.embed("test")?;
        embedder.dimensions = test.len();
        tracing::debug!(model, dimensions = embedder.dimensions, "probed ollama model");
        Ok(embedder)
    }
}

fn parse_response(body: &str) -> Result<Embedding> {
    let resp: EmbeddingResponse = serde_json::from_str(body).context("parsing ollama response")?;
    if resp.embedding.is_empty() {
        bail!("ollama returned an empty embedding");
    }
    Ok(resp.embedding)
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prepare_input(text),
        });

        let mut response = match ureq::post(&url).send_json(&body) {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                bail!("ollama returned HTTP {code}");
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e).context("ollama embedding request failed"));
            }
        };

        let raw = response
            .body_mut()
            .read_to_string()
            .context("reading ollama response")?;
        parse_response(&raw)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
