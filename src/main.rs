use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use vecsim::app::{self, CrossCheck, SearchHit};
use vecsim::config::Config;
use vecsim::embed;
use vecsim::similarity::{self, SimilarityError};
use vecsim::store::VectorStore;
use vecsim::store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "vecsim", version, about = "Embed text, store it, and find what it is closest to")]
struct Cli {
    /// Project root holding the .vecsim directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Embed and store one or more texts
    Save {
        /// Texts to store
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Find the stored texts closest to a query
    Search {
        /// Query text
        query: String,
        /// Number of results (default from config)
        #[arg(long)]
        top_k: Option<usize>,
        /// Recompute each score locally and show the difference
        #[arg(long)]
        verify: bool,
    },
    /// Cosine similarity of two texts
    Compare { a: String, b: String },
    /// Cosine similarity of two literal vectors, e.g. `score 1,0,0 0,1,0`
    Score {
        #[arg(allow_hyphen_values = true)]
        a: String,
        #[arg(allow_hyphen_values = true)]
        b: String,
    },
    /// Store the sample sentences, then prompt for a phrase to search
    Demo,
    /// Show index statistics
    Status,
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VECSIM_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.root.as_path();

    match cli.command {
        Commands::Init => {
            Config::default().save(root)?;
            println!("Wrote {}", Config::config_path(root).display());
        }
        Commands::Save { texts } => {
            let config = Config::load(root)?;
            let embedder = embed::from_config(&config)?;
            let store = open_store(root, &config)?;
            for text in &texts {
                app::save_text(embedder.as_ref(), &store, text)?;
                println!("Successfully saved: '{text}'");
            }
        }
        Commands::Search {
            query,
            top_k,
            verify,
        } => {
            let config = Config::load(root)?;
            let embedder = embed::from_config(&config)?;
            let store = open_store(root, &config)?;
            let top_k = top_k.unwrap_or(config.search.top_k);
            let hits = app::search(embedder.as_ref(), &store, &query, top_k, verify)?;
            print_hits(&query, &hits);
        }
        Commands::Compare { a, b } => {
            let config = Config::load(root)?;
            let embedder = embed::from_config(&config)?;
            let score = app::compare_texts(embedder.as_ref(), &a, &b)?;
            println!("Closeness Score: {score:.4}");
        }
        Commands::Score { a, b } => {
            let a = parse_vector(&a)?;
            let b = parse_vector(&b)?;
            match similarity::cosine_similarity(&a, &b) {
                Ok(score) => println!("{score}"),
                Err(SimilarityError::DegenerateVector) => {
                    println!("undefined (zero-norm vector)");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Demo => {
            let config = Config::load(root)?;
            let embedder = embed::from_config(&config)?;
            let store = open_store(root, &config)?;
            for text in app::SAMPLE_TEXTS {
                app::save_text(embedder.as_ref(), &store, text)?;
                println!("Successfully saved: '{text}'");
            }

            print!("\nEnter a phrase to compare: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            let query = line.trim();
            let hits = app::search(embedder.as_ref(), &store, query, config.search.top_k, true)?;
            print_hits(query, &hits);
        }
        Commands::Status => {
            let config = Config::load(root)?;
            let storage_dir = config.storage_dir(root);
            match SqliteStore::open_if_exists(&storage_dir, config.storage.dimensions)? {
                Some(store) => {
                    let stats = store.stats(&storage_dir)?;
                    println!("Index:      {}", storage_dir.display());
                    println!("Records:    {}", stats.record_count);
                    println!("Dimensions: {}", stats.dimensions);
                    println!("Size:       {} bytes", stats.db_size_bytes);
                    for (model, count) in &stats.models {
                        println!("  {model}: {count}");
                    }
                }
                None => println!("No index at {}", storage_dir.display()),
            }
        }
    }

    Ok(())
}

fn open_store(root: &Path, config: &Config) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.storage_dir(root), config.storage.dimensions)?;
    tracing::debug!(records = store.count()?, "opened index");
    Ok(store)
}

/// An empty string is an empty vector, left for the scorer to reject.
/// An empty component inside a list (`1,,0`) is a parse error.
fn parse_vector(s: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(str::trim)
        .map(|p| {
            p.parse::<f64>()
                .with_context(|| format!("invalid vector component {p:?}"))
        })
        .collect()
}

fn print_hits(query: &str, hits: &[SearchHit]) {
    println!("\nResults for: '{query}'");
    if hits.is_empty() {
        println!("(no stored texts)");
    }
    for hit in hits {
        println!("--- Closeness Score: {:.4} | Text: {}", hit.score, hit.text);
        match hit.check {
            Some(CrossCheck::Computed { local, delta }) => {
                println!("    local check: {local:.6} (delta {delta:.2e})");
            }
            Some(CrossCheck::Undefined) => println!("    local check: undefined"),
            None => {}
        }
    }
}
