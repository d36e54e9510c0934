//=====================================================
// File: config/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Engine configuration
// Objective: Load execution limits and analyzer switches from TOML with
//            defaults for every field
//=====================================================

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;
pub const DEFAULT_WORKER_THREADS: usize = 64;
pub const DEFAULT_WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for one engine and every environment it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Nested script calls allowed before STACK_OVERFLOW.
    pub max_call_depth: usize,
    /// Upper bound on concurrently running script tasks.
    pub worker_threads: usize,
    /// Stack size of each worker, in bytes.
    pub worker_stack_size: usize,
    /// Reject reads of undeclared names at analysis time.
    pub strict_identifiers: bool,
    pub http_timeout_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            worker_threads: DEFAULT_WORKER_THREADS,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
            strict_identifiers: false,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl EngineOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: EngineOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be positive".into()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let options = EngineOptions::from_toml_str("").expect("defaults");
        assert_eq!(options, EngineOptions::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let options = EngineOptions::from_toml_str("max_call_depth = 32\nstrict_identifiers = true\n")
            .expect("parse");
        assert_eq!(options.max_call_depth, 32);
        assert!(options.strict_identifiers);
        assert_eq!(options.worker_threads, DEFAULT_WORKER_THREADS);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = EngineOptions::from_toml_str("max_call_depth = 0").expect_err("invalid");
        assert!(err.to_string().contains("max_call_depth"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "http_timeout_ms = 500").expect("write");
        let options = EngineOptions::load(&path).expect("load");
        assert_eq!(options.http_timeout_ms, 500);
        assert!(EngineOptions::load(dir.path().join("missing.toml")).is_err());
    }
}

//=====================================================
// End of file
//=====================================================
