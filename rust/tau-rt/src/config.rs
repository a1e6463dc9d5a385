//! Execution-unit configuration, loadable from `tau.toml`.
//!
//! ```toml
//! [vm]
//! stack_size = 2048
//! max_frames = 1024
//! heap_capacity = 65536
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STACK_SIZE: usize = 2048;
pub const MAX_FRAMES: usize = 1024;
pub const GLOBALS_SIZE: usize = 65536;
pub const HEAP_CAPACITY: usize = 65536;
pub const SPAWNED_HEAP_CAPACITY: usize = 1000;
pub const GC_THRESHOLD_PERCENT: usize = 90;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Sizes and limits of an execution unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Operand stack capacity, in slots.
    pub stack_size: usize,
    /// Maximum call depth.
    pub max_frames: usize,
    /// Number of global slots.
    pub globals_size: usize,
    /// Initial GC registry capacity of the root unit.
    pub heap_capacity: usize,
    /// Initial GC registry capacity of units spawned by `concurrent_call`.
    pub spawned_heap_capacity: usize,
    /// Registry occupancy, in percent of capacity, that triggers a collection.
    pub gc_threshold_percent: usize,
    /// File name shown in diagnostics.
    pub file: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: STACK_SIZE,
            max_frames: MAX_FRAMES,
            globals_size: GLOBALS_SIZE,
            heap_capacity: HEAP_CAPACITY,
            spawned_heap_capacity: SPAWNED_HEAP_CAPACITY,
            gc_threshold_percent: GC_THRESHOLD_PERCENT,
            file: "<unknown>".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vm: VmConfig,
}

impl VmConfig {
    /// Parse the `[vm]` table of a `tau.toml` document.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<ConfigFile>(s).map(|f| f.vm)
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Search `tau.toml` in `start` and its ancestors. Returns the defaults
    /// when no file is found.
    pub fn discover(start: &Path) -> Result<(Option<PathBuf>, Self), ConfigError> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join("tau.toml");
            if candidate.is_file() {
                let cfg = Self::load_from(&candidate)?;
                return Ok((Some(candidate), cfg));
            }
            if !dir.pop() {
                return Ok((None, Self::default()));
            }
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_stack_size(mut self, n: usize) -> Self {
        self.stack_size = n;
        self
    }

    pub fn with_max_frames(mut self, n: usize) -> Self {
        self.max_frames = n;
        self
    }

    pub fn with_heap_capacity(mut self, n: usize) -> Self {
        self.heap_capacity = n;
        self
    }

    /// Configuration of a unit spawned from this one.
    pub(crate) fn spawned(&self) -> Self {
        Self {
            heap_capacity: self.spawned_heap_capacity,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
