use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".vecsim";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub embed: EmbedConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where the index directory lives (default: `.vecsim` inside the root)
    pub path: Option<PathBuf>,
    /// Vector length the index accepts, fixed when the index is created
    pub dimensions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub backend: EmbedBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmbedBackend {
    #[serde(rename = "openai")]
    OpenAi {
        model: String,
        url: String,
        dimensions: usize,
    },
    #[serde(rename = "ollama")]
    Ollama { model: String, url: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of neighbours returned by a search
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                path: None,
                dimensions: 1536,
            },
            embed: EmbedConfig {
                backend: EmbedBackend::OpenAi {
                    model: "text-embedding-3-small".to_string(),
                    url: "https://api.openai.com/v1".to_string(),
                    dimensions: 1536,
                },
            },
            search: SearchConfig { top_k: 3 },
        }
    }
}

impl Config {
    /// Load config from `.vecsim/config.toml` under `root`, falling back to defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = Self::config_path(root);
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading config from {}", config_path.display()))?;
            let config: Self = toml::from_str(&contents)
                .with_context(|| format!("parsing config from {}", config_path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join("config.toml")
    }

    /// Resolve the actual storage directory path.
    pub fn storage_dir(&self, root: &Path) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| root.join(CONFIG_DIR))
    }

    fn validate(&self) -> Result<()> {
        if self.storage.dimensions == 0 {
            bail!("storage.dimensions must be greater than zero");
        }
        if self.search.top_k == 0 {
            bail!("search.top_k must be greater than zero");
        }
        if let EmbedBackend::OpenAi { dimensions, .. } = &self.embed.backend {
            if *dimensions != self.storage.dimensions {
                bail!(
                    "embedding model produces {dimensions} dimensions but the index expects {}",
                    self.storage.dimensions
                );
            }
        }
        Ok(())
    }

    /// Write current config to `.vecsim/config.toml` (for `vecsim init`).
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_path = Self::config_path(root);
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating config dir {}", dir.display()))?;
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("writing config to {}", config_path.display()))?;
        Ok(())
    }
}

/// Read the embedding API key from the environment (after `.env` has been loaded).
pub fn api_key() -> Result<String> {
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{API_KEY_VAR} is not set (export it or put it in a .env file)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.storage.dimensions, 1536);
        assert_eq!(config.search.top_k, 3);
        assert!(matches!(
            config.embed.backend,
            EmbedBackend::OpenAi { ref model, .. } if model == "text-embedding-3-small"
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.search.top_k = 7;
        config.save(dir.path()).unwrap();

        assert!(Config::config_path(dir.path()).exists());
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.search.top_k, 7);
    }

    #[test]
    fn parses_ollama_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            Config::config_path(dir.path()),
            r#"
[storage]
dimensions = 768

[embed.backend]
type = "ollama"
model = "nomic-embed-text"
url = "http://localhost:11434"

[search]
top_k = 5
"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.storage.dimensions, 768);
        assert!(matches!(config.embed.backend, EmbedBackend::Ollama { .. }));
    }

    #[test]
    fn rejects_dimension_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.dimensions = 3;
        config.save(dir.path()).unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("1536"));
    }

    #[test]
    fn storage_dir_override() {
        let mut config = Config::default();
        let root = Path::new("/tmp/project");
        assert_eq!(config.storage_dir(root), root.join(CONFIG_DIR));
        config.storage.path = Some(PathBuf::from("/var/vecsim"));
        assert_eq!(config.storage_dir(root), PathBuf::from("/var/vecsim"));
    }
}
