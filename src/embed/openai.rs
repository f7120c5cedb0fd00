use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{Embedder, Embedding, prepare_input};

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: &str, dimensions: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            dimensions,
        }
    }
}

fn parse_response(body: &str) -> Result<Embedding> {
    let resp: EmbeddingResponse =
        serde_json::from_str(body).context("parsing embeddings response")?;
    match resp.data.into_iter().next() {
        Some(d) if !d.embedding.is_empty() => Ok(d.embedding),
        _ => bail!("embeddings response contained no vector"),
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "input": [prepare_input(text)],
            "model": self.model,
        });

        let result = ureq::post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body);

        let mut response = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                bail!("embeddings API returned HTTP {code}");
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e).context("embeddings request failed"));
            }
        };

        let raw = response
            .body_mut()
            .read_to_string()
            .context("reading embeddings response")?;
        let embedding = parse_response(&raw)?;
        if embedding.len() != self.dimensions {
            bail!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            );
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_vector() {
        let body = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 5, "total_tokens": 5}
        }"#;
        assert_eq!(parse_response(body).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn empty_data_is_an_error() {
        let err = parse_response(r#"{"data": []}"#).unwrap_err();
        assert!(err.to_string().contains("no vector"));
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let e = OpenAiEmbedder::new("https://api.openai.com/v1/", "m", "k", 4);
        assert_eq!(e.base_url, "https://api.openai.com/v1");
        assert_eq!(e.dimensions(), 4);
        assert_eq!(e.model_name(), "m");
    }
}
