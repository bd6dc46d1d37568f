use std::path::PathBuf;

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite identity database.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Embedding dimensionality, fixed by the extractor contract.
    pub embedding_dim: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    ///
    /// The threshold default of 0.6 is the conventional tolerance for
    /// dlib-style 128-dim face encodings under Euclidean distance.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        Self {
            db_path,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", 0.6),
            embedding_dim: env_usize("ROLLCALL_EMBEDDING_DIM", 128),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
