//! CLI-level engine configuration.
//!
//! `modular_core` itself takes configuration as plain constructor arguments
//! and has no config-file concept of its own. This is the CLI front-end's
//! settings layer: a small `serde`-deserialized struct read from an optional
//! TOML file, with `clap` flags overriding whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
pub const DEFAULT_WORKER_THREADS: usize = 2;
pub const DEFAULT_BLOCK_FRAMES: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub worker_threads: usize,
    pub block_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            worker_threads: DEFAULT_WORKER_THREADS,
            block_frames: DEFAULT_BLOCK_FRAMES,
        }
    }
}

impl EngineConfig {
    /// Load from `path` if given and present; otherwise the defaults. A path
    /// that exists but fails to parse is a real error, not something to
    /// paper over with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("failed to parse config {}: {e}", path.display()))
    }

    pub fn with_overrides(
        mut self,
        sample_rate: Option<f32>,
        worker_threads: Option<usize>,
        block_frames: Option<usize>,
    ) -> Self {
        if let Some(v) = sample_rate {
            self.sample_rate = v;
        }
        if let Some(v) = worker_threads {
            self.worker_threads = v;
        }
        if let Some(v) = block_frames {
            self.block_frames = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load(Some(Path::new("/nonexistent/modular.toml"))).unwrap();
        assert_eq!(cfg.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(cfg.worker_threads, DEFAULT_WORKER_THREADS);
    }

    #[test]
    fn no_path_is_default() {
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.block_frames, DEFAULT_BLOCK_FRAMES);
    }

    #[test]
    fn overrides_win_over_defaults() {
        let cfg = EngineConfig::default().with_overrides(Some(96_000.0), Some(4), None);
        assert_eq!(cfg.sample_rate, 96_000.0);
        assert_eq!(cfg.worker_threads, 4);
        assert_eq!(cfg.block_frames, DEFAULT_BLOCK_FRAMES);
    }
}
