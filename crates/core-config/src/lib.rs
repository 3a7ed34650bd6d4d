//! Configuration loading and parsing.
//!
//! Parses an optional `fresco.toml` from the working directory (or an
//! explicit path provided by the binary). Every field has a default equal
//! to the protocol constants, so the server runs with no file at all; a
//! missing file or a parse error silently falls back to defaults. The
//! autosave interval is clamped to a floor so a typo cannot spin the save
//! loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

/// Shortest allowed autosave interval, in seconds.
pub const MIN_AUTOSAVE_SECS: u64 = 5;

#[derive(Debug, Deserialize, Clone)]
pub struct PersistSection {
    /// Document filename, relative to the working directory.
    #[serde(default = "PersistSection::default_document")]
    pub document: PathBuf,
    #[serde(default = "PersistSection::default_autosave_secs")]
    pub autosave_secs: u64,
}

impl PersistSection {
    fn default_document() -> PathBuf {
        PathBuf::from(core_persist::DEFAULT_DOCUMENT)
    }

    const fn default_autosave_secs() -> u64 {
        60
    }
}

impl Default for PersistSection {
    fn default() -> Self {
        Self {
            document: Self::default_document(),
            autosave_secs: Self::default_autosave_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetSection {
    /// Address the reliable listener and the rooms' unreliable sockets bind.
    #[serde(default = "NetSection::default_bind")]
    pub bind: String,
    #[serde(default = "NetSection::default_tcp_port")]
    pub tcp_port: u16,
}

impl NetSection {
    fn default_bind() -> String {
        "0.0.0.0".to_string()
    }

    const fn default_tcp_port() -> u16 {
        core_proto::TCP_PORT
    }
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            tcp_port: Self::default_tcp_port(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub persist: PersistSection,
    #[serde(default)]
    pub net: NetSection,
}

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub file: ConfigFile,
}

impl Config {
    /// Autosave interval with the floor applied; a clamped value is logged.
    pub fn autosave_interval(&self) -> Duration {
        let raw = self.file.persist.autosave_secs;
        let clamped = raw.max(MIN_AUTOSAVE_SECS);
        if clamped != raw {
            info!(target: "config", raw, clamped, "autosave_interval_clamped");
        }
        Duration::from_secs(clamped)
    }

    pub fn document_path(&self) -> &PathBuf {
        &self.file.persist.document
    }

    pub fn tcp_port(&self) -> u16 {
        self.file.net.tcp_port
    }

    pub fn bind_addr(&self) -> &str {
        &self.file.net.bind
    }

    /// UDP port of a room's unreliable socket for this deployment.
    pub fn udp_port(&self, canvas_id: u8) -> u16 {
        core_proto::udp_port_for(self.tcp_port(), canvas_id)
    }
}

/// Configuration path: `fresco.toml` beside the process.
pub fn discover() -> PathBuf {
    PathBuf::from("fresco.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config { file }),
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config parse failed; using defaults");
                Ok(Config::default())
            }
        },
        Err(_) => Ok(Config::default()),
    }
}
