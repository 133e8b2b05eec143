//! Configuration loading
//!
//! This module provides functions to:
//! - Parse the TOML config file (`~/.config/directus-sync/config.toml`)
//! - Overlay environment variables (`DIRECTUS_*`, `GITSYNC_*`)
//! - Derive the export directory from a git-sync checkout

use std::path::{Path, PathBuf};
use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::api::{ClientConfig, DEFAULT_PAGE_SIZE};
use crate::sync::logic::execution::ApplyOptions;
use crate::sync::schema_sync::SchemaOptions;

pub const DEFAULT_URL: &str = "http://localhost:8055";
pub const DEFAULT_EXPORT_DIR: &str = "export";
const CONFIG_DIR: &str = "directus-sync";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "Failed to read {}: {}", path.display(), source),
            Self::Parse { path, source } => {
                write!(f, "Invalid config file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url: String,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Static access token, used instead of email/password
    pub token: Option<String>,
    pub export_dir: PathBuf,
    pub sync: SyncConfig,
    pub client: ClientSection,
    pub data: DataConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            email: None,
            password: None,
            token: None,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            sync: SyncConfig::default(),
            client: ClientSection::default(),
            data: DataConfig::default(),
        }
    }
}

/// `[sync]`: how apply reconciles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fields ignored when comparing and never sent (besides `user_created`)
    pub ignored_fields: Vec<String>,
    pub allow_delete: bool,
    pub confirm_destructive: bool,
    pub force_schema: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ignored_fields: Vec::new(),
            allow_delete: true,
            confirm_destructive: true,
            force_schema: false,
        }
    }
}

/// `[client]`: HTTP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// `[data]`: collection data export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Fields dropped from exported items
    pub drop_fields: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            drop_fields: vec!["user_created".to_string(), "user_updated".to_string()],
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/directus-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load an explicit file, or the default file when it exists, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    log::debug!("Using config file {}", path.display());
                    Self::from_file(&path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = var("DIRECTUS_URL") {
            self.url = url;
        }
        if let Some(email) = var("DIRECTUS_EMAIL") {
            self.email = Some(email);
        }
        if let Some(password) = var("DIRECTUS_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(token) = var("DIRECTUS_TOKEN") {
            self.token = Some(token);
        }
        if let Some(dir) = gitsync_export_dir(
            var("GITSYNC_REPO").as_deref(),
            var("GITSYNC_LINK").as_deref(),
            var("GITSYNC_ROOT").as_deref(),
        ) {
            self.export_dir = dir;
        }
    }

    /// Overlay the process environment
    pub fn apply_process_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .timeout(Duration::from_secs(self.client.timeout_secs))
            .page_size(self.client.page_size)
            .build()
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions::default()
            .ignore_fields(self.sync.ignored_fields.iter().cloned())
            .allow_delete(self.sync.allow_delete)
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            force: self.sync.force_schema,
            confirm_destructive: self.sync.confirm_destructive,
            ..SchemaOptions::default()
        }
    }
}

/// Export directory of a git-sync checkout: `ROOT/LINK`, where the link
/// defaults to the repository name without `.git`
pub fn gitsync_export_dir(
    repo: Option<&str>,
    link: Option<&str>,
    root: Option<&str>,
) -> Option<PathBuf> {
    let link = link.map(str::to_string).or_else(|| {
        let name = repo?.trim_end_matches('/').rsplit('/').next()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    })?;
    Some(Path::new(root?).join(link))
}
