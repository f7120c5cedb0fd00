pub mod ollama;
pub mod openai;

use anyhow::{Result, bail};

use crate::config::{self, Config, EmbedBackend};

pub type Embedding = Vec<f32>;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Build the embedder selected in the config.
pub fn from_config(config: &Config) -> Result<Box<dyn Embedder>> {
    let embedder: Box<dyn Embedder> = match &config.embed.backend {
        EmbedBackend::OpenAi {
            model,
            url,
            dimensions,
        } => {
            let key = config::api_key()?;
            Box::new(openai::OpenAiEmbedder::new(url, model, &key, *dimensions))
        }
        EmbedBackend::Ollama { model, url } => Box::new(ollama::OllamaEmbedder::new(url, model)?),
    };
    check_dimensions(embedder.as_ref(), config.storage.dimensions)?;
    Ok(embedder)
}

/// The embedder's output length must match the index.
pub fn check_dimensions(embedder: &dyn Embedder, expected: usize) -> Result<()> {
    if embedder.dimensions() != expected {
        bail!(
            "model {} produces {} dimensions but storage.dimensions is {expected}",
            embedder.model_name(),
            embedder.dimensions()
        );
    }
    Ok(())
}

/// Texts sent to an embedding API must not be empty.
pub(crate) fn prepare_input(text: &str) -> &str {
    if text.is_empty() { " " } else { text }
}
