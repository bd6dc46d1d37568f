use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::Embedding;
use rollcall_service::{Config, RollcallService};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall identity matching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an embedding for an identity
    Enroll {
        /// Identity id (e.g., a user id)
        identity: String,
        /// Human-readable label for diagnostics
        #[arg(short, long)]
        name: Option<String>,
        /// JSON file containing the embedding as an array of floats
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Verify a probe against a specific claimed identity (1:1)
    Verify {
        /// Claimed identity id
        identity: String,
        /// JSON file containing the probe embedding
        #[arg(short, long)]
        probe: PathBuf,
        /// Maximum distance for a match (default: from config)
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Search all enrolled identities for the best match (1:N)
    Identify {
        /// JSON file containing the probe embedding
        #[arg(short, long)]
        probe: PathBuf,
        /// Maximum distance for a match (default: from config)
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity id to remove
        identity: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let service = RollcallService::open(&config).context("opening identity store")?;

    match cli.command {
        Commands::Enroll {
            identity,
            name,
            embedding,
        } => {
            let embedding = read_embedding(&embedding)?;
            // The CLI feeds a pre-extracted embedding straight into the
            // store; image-based enrollment goes through a FaceExtractor
            // in the hosting application.
            let total = service
                .store()
                .upsert(&identity, name.as_deref(), &[embedding])?;
            println!("enrolled {identity}: {total} embedding(s) on file");
        }
        Commands::Verify {
            identity,
            probe,
            threshold,
        } => {
            let probe = read_embedding(&probe)?;
            let threshold = threshold.unwrap_or(config.match_threshold);
            let result = service.verify(&probe, &identity, threshold)?;
            match (result.matched, result.distance) {
                (true, Some(d)) => println!("match: {identity} (distance {d:.4})"),
                (false, Some(d)) => println!("no match: {identity} (distance {d:.4})"),
                _ => println!("no match: {identity} is not enrolled"),
            }
        }
        Commands::Identify { probe, threshold } => {
            let probe = read_embedding(&probe)?;
            let threshold = threshold.unwrap_or(config.match_threshold);
            let result = service.identify(&probe, threshold)?;
            if result.matched {
                let id = result.identity_id.as_deref().unwrap_or("?");
                let name = result.display_name.as_deref().unwrap_or("-");
                let d = result.distance.unwrap_or(f32::NAN);
                println!("match: {id} ({name}), distance {d:.4}");
            } else {
                match result.distance {
                    Some(d) => println!("no match (best distance {d:.4})"),
                    None => println!("no match (no identities enrolled)"),
                }
            }
        }
        Commands::List => {
            let summaries = service.list_identities()?;
            if summaries.is_empty() {
                println!("no identities enrolled");
            } else {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
        }
        Commands::Remove { identity } => {
            if service.remove_identity(&identity)? {
                println!("removed {identity}");
            } else {
                println!("{identity} was not enrolled");
            }
        }
    }

    Ok(())
}

/// Read an embedding from a JSON array-of-floats file.
fn read_embedding(path: &Path) -> Result<Embedding> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<f32> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {} as a JSON float array", path.display()))?;
    Ok(Embedding::new(values))
}
