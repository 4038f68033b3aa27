//! # Configuration Module
//!
//! [`StoreSettings`] is the host-application-facing configuration layer: a
//! serde-serializable, JSON-backed settings file with sensible defaults for
//! anything missing from disk. The core [`crate::engine::Engine`] itself
//! stays free of file I/O and serde — it only ever sees the narrower
//! [`crate::engine::EngineConfig`] that [`StoreSettings::engine_config`]
//! produces.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;

/// Configuration for the `ordinalkv-cli` and other host applications.
///
/// Deserialized with `#[serde(default)]` so a settings file that only
/// overrides one field still loads cleanly; any field missing from the JSON
/// falls back to [`Default::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory the engine owns on disk.
    pub data_dir: PathBuf,
    /// Byte ceiling at which the memtable flushes to level 0.
    pub write_buffer_size: usize,
    /// `tracing-subscriber` `EnvFilter` directive string, e.g. `"info"` or
    /// `"ordinalkv=debug"`.
    pub log_filter: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            write_buffer_size: 4 * 1024 * 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl StoreSettings {
    /// Loads settings from a JSON file at `path`, falling back to
    /// [`Default::default`] field-by-field for anything the file omits.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let file = File::open(path.into())?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Writes the current settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: impl Into<PathBuf>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path.into())?;
        file.write_all(json.as_bytes())
    }

    /// Narrows these settings down to what the core engine actually needs.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.data_dir.clone(), self.write_buffer_size)
    }
}
