//! Access configuration from file and environment.

use std::path::PathBuf;

use serde::Deserialize;

use crate::chunk::{ChunkSize, DEFAULT_CHUNK_SIZE};
use crate::control::Capabilities;
use crate::identity::Credentials;
use crate::name::{Name, NameError, NameSegment};
use crate::portal::Timeout;

/// Access configuration. File: ~/.config/ccnx-access/config.toml or /etc/ccnx-access/config.toml.
/// Env overrides: CCNX_STREAMS_SEEKABLE, CCNX_FORWARDER, CCNX_NETWORK_CACHING, CCNX_TIMEOUT_MS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Whether streams advertise seeking (default true).
    #[serde(default = "default_seekable")]
    pub seekable: bool,
    /// Name prefix the serving side listens on.
    #[serde(default = "default_domain_prefix")]
    pub domain_prefix: String,
    /// Command segment after the prefix.
    #[serde(default = "default_command")]
    pub command: String,
    /// Opaque segments appended after the chunk number (decoding profile of the server).
    #[serde(default = "default_trailer_segments")]
    pub trailer_segments: Vec<String>,
    /// Chunk size assumed until the first response.
    #[serde(default = "default_initial_chunk_size")]
    pub initial_chunk_size: u64,
    /// Host network caching in milliseconds, reported as playback latency.
    #[serde(default = "default_network_caching_ms")]
    pub network_caching_ms: u64,
    /// Per-exchange timeout. Absent: wait forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Forwarder address for TCP portals.
    #[serde(default = "default_forwarder")]
    pub forwarder: String,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_seekable() -> bool {
    true
}
fn default_domain_prefix() -> String {
    "ccnx:/ccnx/tutorial".to_string()
}
fn default_command() -> String {
    "fetch".to_string()
}
fn default_trailer_segments() -> Vec<String> {
    vec!["F50".to_string(), "L4".to_string()]
}
fn default_initial_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}
fn default_network_caching_ms() -> u64 {
    1000
}
fn default_forwarder() -> String {
    "127.0.0.1:9695".to_string()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            seekable: default_seekable(),
            domain_prefix: default_domain_prefix(),
            command: default_command(),
            trailer_segments: default_trailer_segments(),
            initial_chunk_size: default_initial_chunk_size(),
            network_caching_ms: default_network_caching_ms(),
            timeout_ms: None,
            forwarder: default_forwarder(),
            credentials: Credentials::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("domain prefix: {0}")]
    Prefix(#[from] NameError),
    #[error("initial chunk size must be positive")]
    ZeroChunkSize,
}

impl AccessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let c: AccessConfig = toml::from_str(s)?;
        c.validate()?;
        Ok(c)
    }

    /// Reject settings a stream cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prefix_name()?;
        self.chunk_size()?;
        Ok(())
    }

    pub fn prefix_name(&self) -> Result<Name, NameError> {
        Name::parse_uri(&self.domain_prefix)
    }

    pub fn chunk_size(&self) -> Result<ChunkSize, ConfigError> {
        ChunkSize::new(self.initial_chunk_size).ok_or(ConfigError::ZeroChunkSize)
    }

    pub fn trailer(&self) -> Vec<NameSegment> {
        self.trailer_segments
            .iter()
            .map(|s| NameSegment::name(s.as_bytes()))
            .collect()
    }

    pub fn timeout(&self) -> Timeout {
        Timeout::from_millis(self.timeout_ms)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            seekable: self.seekable,
            network_caching_ms: self.network_caching_ms,
        }
    }

    /// Apply environment overrides through `var` (std::env::var in production).
    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(s) = var("CCNX_STREAMS_SEEKABLE") {
            match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.seekable = true,
                "0" | "false" | "no" | "off" => self.seekable = false,
                _ => log::warn!("ignoring CCNX_STREAMS_SEEKABLE={}", s),
            }
        }
        if let Some(s) = var("CCNX_FORWARDER") {
            if !s.is_empty() {
                self.forwarder = s;
            }
        }
        if let Some(s) = var("CCNX_NETWORK_CACHING") {
            if let Ok(ms) = s.parse::<u64>() {
                self.network_caching_ms = ms;
            }
        }
        if let Some(s) = var("CCNX_TIMEOUT_MS") {
            match s.as_str() {
                "" | "never" => self.timeout_ms = None,
                _ => {
                    if let Ok(ms) = s.parse::<u64>() {
                        self.timeout_ms = Some(ms);
                    }
                }
            }
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> AccessConfig {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|k| std::env::var(k).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/ccnx-access/config.toml"));
    }
    out.push(PathBuf::from("/etc/ccnx-access/config.toml"));
    out
}

fn load_file() -> Option<AccessConfig> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match AccessConfig::from_toml_str(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => log::warn!("ignoring {}: {}", p.display(), e),
                },
                Err(e) => log::warn!("cannot read {}: {}", p.display(), e),
            }
            break;
        }
    }
    None
}
