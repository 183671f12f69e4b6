//! Controller configuration and datapath admission.

use crate::event::DatapathId;
use serde::Deserialize;
use smoltcp::wire::EthernetAddress;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Default payload pattern: HTML href attributes.
pub const DEFAULT_DPI_PATTERN: &str = r#"href="[^"]*""#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid MAC address in allow-list: {0}")]
    InvalidMac(String),

    #[error("Invalid DPI pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// On-disk JSON layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    allow_list: Vec<String>,
    #[serde(default = "default_true")]
    l2_switching: bool,
    #[serde(default)]
    dpi_enabled: bool,
    #[serde(default = "default_pattern")]
    dpi_pattern: String,
}

fn default_true() -> bool {
    true
}

fn default_pattern() -> String {
    DEFAULT_DPI_PATTERN.to_string()
}

/// Controller configuration. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Link-layer addresses of datapaths allowed to be programmed.
    pub allow_list: HashSet<EthernetAddress>,
    /// Install the learning-switch program on admitted datapaths.
    pub l2_switching: bool,
    /// Install the HTTP inspection program on admitted datapaths.
    pub dpi_enabled: bool,
    /// Pattern extracted from inspected payloads.
    pub dpi_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_list: HashSet::new(),
            l2_switching: true,
            dpi_enabled: false,
            dpi_pattern: default_pattern(),
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw)?;

        let allow_list = file
            .allow_list
            .iter()
            .map(|s| parse_mac(s).ok_or_else(|| ConfigError::InvalidMac(s.clone())))
            .collect::<Result<HashSet<_>>>()?;

        // Compile once here so a bad pattern fails at load time.
        regex::bytes::Regex::new(&file.dpi_pattern)?;

        if allow_list.is_empty() {
            warn!("Datapath allow-list is empty, no switch will be programmed");
        }

        Ok(Self {
            allow_list,
            l2_switching: file.l2_switching,
            dpi_enabled: file.dpi_enabled,
            dpi_pattern: file.dpi_pattern,
        })
    }

    /// Add a datapath link address to the allow-list.
    pub fn allow(mut self, mac: EthernetAddress) -> Self {
        self.allow_list.insert(mac);
        self
    }

    pub fn with_dpi(mut self, enabled: bool) -> Self {
        self.dpi_enabled = enabled;
        self
    }

    pub fn with_l2_switching(mut self, enabled: bool) -> Self {
        self.l2_switching = enabled;
        self
    }

    /// Whether flow programs may be installed on `dpid`.
    ///
    /// Deny by default: an empty allow-list rejects every datapath.
    pub fn can_handshake(&self, dpid: DatapathId) -> bool {
        let allowed = self.allow_list.contains(&dpid.mac());
        debug!(dpid = %dpid, mac = %dpid.mac(), allowed, "Admission check");
        allowed
    }
}

/// Parse a MAC address in `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff` form.
pub fn parse_mac(mac_str: &str) -> Option<EthernetAddress> {
    let parts: Vec<&str> = mac_str.split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        mac[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(EthernetAddress(mac))
}
