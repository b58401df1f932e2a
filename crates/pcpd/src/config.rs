//! Configuration file handling for pcpd

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default listen address, loopback only
pub const DEFAULT_LISTEN: &str = "127.0.0.1:18090";

/// Name of the static content directory next to the executable
pub const CONTENT_DIR_NAME: &str = "wwwroot";

/// How reboot confirmations are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    /// Prompt on the daemon's terminal
    Console,
    /// Refuse every reboot
    Deny,
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub log: LogSection,
    pub confirm: ConfirmSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: Option<SocketAddr>,
    pub content_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmSection {
    pub mode: Option<ConfirmMode>,
}

/// Values given on the command line, each overriding the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub content_root: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub confirm: Option<ConfirmMode>,
}

impl Config {
    /// Load configuration from the default config file, if there is one
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pcpd");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    ///
    /// `exe_dir` anchors the default content root.
    pub fn merge_with_args(&self, args: &Overrides, exe_dir: &Path) -> Result<MergedConfig> {
        let listen = match args.listen.or(self.server.listen) {
            Some(listen) => listen,
            None => DEFAULT_LISTEN.parse()?,
        };
        let content_root = match args
            .content_root
            .clone()
            .or_else(|| self.server.content_root.clone())
        {
            Some(root) => root,
            None => resolve_content_root(exe_dir).with_context(|| {
                format!("Failed to create content root in {}", exe_dir.display())
            })?,
        };

        Ok(MergedConfig {
            listen,
            content_root,
            log_path: args
                .log_file
                .clone()
                .or_else(|| self.log.path.clone())
                .unwrap_or_else(pcp_bridge::default_log_path),
            confirm: args
                .confirm
                .or(self.confirm.mode)
                .unwrap_or(ConfirmMode::Console),
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig {
    pub listen: SocketAddr,
    pub content_root: PathBuf,
    pub log_path: PathBuf,
    pub confirm: ConfirmMode,
}

/// Locate the static content root.
///
/// `<exe>/wwwroot` when present, else the source-tree location three levels
/// up from a build output directory, else `<exe>/wwwroot` is created.
pub fn resolve_content_root(exe_dir: &Path) -> std::io::Result<PathBuf> {
    let root = exe_dir.join(CONTENT_DIR_NAME);
    if root.is_dir() {
        return Ok(root);
    }

    let dev_root = exe_dir.join("..").join("..").join("..").join(CONTENT_DIR_NAME);
    if dev_root.is_dir() {
        return Ok(dev_root);
    }

    std::fs::create_dir_all(&root)?;
    Ok(root)
}
