//! Configuration read once at startup from the process environment.
//!
//! Everything is resolved through a lookup function so that tests can supply a map instead
//! of mutating the real environment. Missing or malformed values are fatal: no backup work
//! starts with an invalid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Portal base URL used when `AGO_URL` is not set
pub const DEFAULT_PORTAL_URL: &str = "https://governmentofbc.maps.arcgis.com";
/// Item types backed up when `AGO_BACKUP_TYPES` is not set
pub const DEFAULT_BACKUP_TYPES: [&str; 2] = ["Web Map", "Web Experience"];
/// Retention window used when `BACKUP_RETENTION_DAYS` is not set
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
/// Longest accepted retention window, roughly a century
pub const MAX_RETENTION_DAYS: u32 = 36_500;
/// Root key prefix used when `BACKUP_PREFIX` is not set
pub const DEFAULT_KEY_PREFIX: &str = "ago_backups";
/// Portal page size used when `AGO_MAX_ITEMS` is not set
pub const DEFAULT_MAX_ITEMS: usize = 100;
/// HTTP timeout used when `AGO_TIMEOUT_SECS` is not set
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Signing region used when `OBJ_STORE_REGION` is not set
pub const DEFAULT_REGION: &str = "us-east-1";

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// How a folder title is compared against the configured target titles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderMatch {
    /// The folder title equals one of the targets
    #[default]
    Exact,
    /// The folder title contains one of the targets as a substring
    Contains,
}

impl FolderMatch {
    /// Returns true if `title` selects the folder under this policy
    pub fn matches<S: AsRef<str>>(&self, title: &str, targets: &[S]) -> bool {
        match self {
            FolderMatch::Exact => targets.iter().any(|t| t.as_ref() == title),
            FolderMatch::Contains => targets.iter().any(|t| title.contains(t.as_ref())),
        }
    }
}

impl FromStr for FolderMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(FolderMatch::Exact),
            "contains" | "substring" => Ok(FolderMatch::Contains),
            other => Err(format!("expected `exact` or `contains`, got `{}`", other)),
        }
    }
}

/// Credentials used to sign in to the portal
#[derive(Clone, PartialEq)]
pub enum PortalCredentials {
    /// Username/password exchanged for a token via `generateToken`
    Password(String),
    /// Pre-issued token, used as is
    Token(String),
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalCredentials::Password(_) => f.write_str("Password(***)"),
            PortalCredentials::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Portal connection settings
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub url: String,
    pub username: String,
    pub credentials: PortalCredentials,
    /// Page size for folder item listings
    pub max_items: usize,
    pub timeout: Duration,
}

/// Object storage connection settings
#[derive(Clone)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    /// Full endpoint URL, e.g. `https://objectstore.example.com`
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

/// Settings that drive a backup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Account usernames whose folders are scanned
    pub accounts: Vec<String>,
    /// Folder titles selected for backup
    pub target_folders: Vec<String>,
    pub folder_match: FolderMatch,
    /// Item types eligible for backup
    pub backup_types: Vec<String>,
    /// Retention window for folders without an override
    pub retention_days: u32,
    /// Per-folder retention windows, keyed by folder title
    #[serde(default)]
    pub folder_retention: HashMap<String, u32>,
    /// Root of every archived key
    pub key_prefix: String,
}

impl BackupConfig {
    /// Defaults for everything except the accounts and target folders
    pub fn for_accounts<A, F>(accounts: A, target_folders: F) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            accounts: accounts.into_iter().map(Into::into).collect(),
            target_folders: target_folders.into_iter().map(Into::into).collect(),
            folder_match: FolderMatch::default(),
            backup_types: DEFAULT_BACKUP_TYPES.iter().map(|s| s.to_string()).collect(),
            retention_days: DEFAULT_RETENTION_DAYS,
            folder_retention: HashMap::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_folder_match(mut self, folder_match: FolderMatch) -> Self {
        self.folder_match = folder_match;
        self
    }

    pub fn with_backup_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.backup_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Keep backups of the folder titled `folder` for `days` instead of the default window
    pub fn with_folder_retention(mut self, folder: impl Into<String>, days: u32) -> Self {
        self.folder_retention.insert(folder.into(), days);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Returns true if items of `item_type` are eligible for backup
    pub fn is_backup_type(&self, item_type: &str) -> bool {
        self.backup_types.iter().any(|t| t == item_type)
    }

    /// Retention window in days for the folder titled `folder`
    pub fn retention_for(&self, folder: &str) -> u32 {
        self.folder_retention
            .get(folder)
            .copied()
            .unwrap_or(self.retention_days)
    }

    /// Returns true if a folder with this title is a backup target
    pub fn is_target_folder(&self, title: &str) -> bool {
        self.folder_match.matches(title, &self.target_folders)
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an in-memory map
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);

        let username = vars.required("AGO_USER")?;
        let credentials = match vars.optional("AGO_TOKEN") {
            Some(token) => PortalCredentials::Token(token),
            None => PortalCredentials::Password(vars.required("AGO_PASS")?),
        };

        let portal = PortalConfig {
            url: vars
                .optional("AGO_URL")
                .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            username: username.clone(),
            credentials,
            max_items: vars.parsed("AGO_MAX_ITEMS", DEFAULT_MAX_ITEMS)?,
            timeout: Duration::from_secs(vars.parsed("AGO_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
        };
        if portal.max_items == 0 {
            return Err(invalid("AGO_MAX_ITEMS", "0", "must be at least 1"));
        }
        if portal.timeout.is_zero() {
            return Err(invalid("AGO_TIMEOUT_SECS", "0", "must be at least 1"));
        }

        let host = vars.required("OBJ_STORE_HOST")?;
        let endpoint = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        let storage = StorageConfig {
            access_key: vars.required("SIES_OBJ_STORE_USER")?,
            secret_key: vars.required("SIES_OBJ_STORE_API_KEY")?,
            endpoint,
            bucket: vars.required("OBJ_STORE_BUCKET")?,
            region: vars
                .optional("OBJ_STORE_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        };

        let accounts = vars
            .list("AGO_ACCOUNTS")
            .unwrap_or_else(|| vec![username.clone()]);
        let target_folders = vars
            .list("AGO_FOLDERS")
            .ok_or_else(|| ConfigError::Missing("AGO_FOLDERS".to_string()))?;

        let folder_match = match vars.optional("AGO_FOLDER_MATCH") {
            Some(raw) => raw
                .parse::<FolderMatch>()
                .map_err(|reason| invalid("AGO_FOLDER_MATCH", &raw, &reason))?,
            None => FolderMatch::default(),
        };

        let backup_types = vars
            .list("AGO_BACKUP_TYPES")
            .unwrap_or_else(|| DEFAULT_BACKUP_TYPES.iter().map(|s| s.to_string()).collect());

        let retention_days = check_retention(
            "BACKUP_RETENTION_DAYS",
            vars.parsed("BACKUP_RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?,
        )?;
        let folder_retention = match vars.optional("AGO_FOLDER_RETENTION") {
            Some(raw) => parse_folder_retention(&raw)?,
            None => HashMap::new(),
        };

        let key_prefix = vars
            .optional("BACKUP_PREFIX")
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
        if key_prefix.is_empty() {
            return Err(invalid("BACKUP_PREFIX", "", "must not be empty"));
        }

        Ok(Self {
            portal,
            storage,
            backup: BackupConfig {
                accounts,
                target_folders,
                folder_match,
                backup_types,
                retention_days,
                folder_retention,
                key_prefix,
            },
        })
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_retention(key: &str, days: u32) -> Result<u32, ConfigError> {
    if days == 0 {
        return Err(invalid(key, "0", "must be at least 1"));
    }
    if days > MAX_RETENTION_DAYS {
        return Err(invalid(
            key,
            &days.to_string(),
            &format!("must be at most {}", MAX_RETENTION_DAYS),
        ));
    }
    Ok(days)
}

/// `Title=days` pairs separated by commas; the last `=` splits title from days
fn parse_folder_retention(raw: &str) -> Result<HashMap<String, u32>, ConfigError> {
    const KEY: &str = "AGO_FOLDER_RETENTION";

    let mut windows = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (title, days) = entry
            .rsplit_once('=')
            .ok_or_else(|| invalid(KEY, entry, "expected `Folder Title=days`"))?;
        let title = title.trim();
        if title.is_empty() {
            return Err(invalid(KEY, entry, "folder title is empty"));
        }
        let days = days
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(KEY, entry, &e.to_string()))?;
        windows.insert(title.to_string(), check_retention(KEY, days)?);
    }
    Ok(windows)
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| invalid(key, &raw, &e.to_string())),
            None => Ok(default),
        }
    }

    /// Comma separated list; `None` when unset or empty
    fn list(&self, key: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .optional(key)?
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }
}
