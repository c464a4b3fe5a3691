//! Configuration for the sync and notify workflows

use crate::error::SyncError;
use crate::sync::headers::{Field, HeaderNames};
use crate::sync::record::ScanLimits;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sheetsync.toml";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Folder holding the agency workbooks, searched recursively
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    /// Master workbook holding the destination, request and audit sheets
    #[serde(default = "default_master_workbook")]
    pub master_workbook: PathBuf,
    /// Substring a source file name must contain
    #[serde(default)]
    pub name_filter: String,
    /// Sheet read from each source workbook; the first sheet when unset
    #[serde(default)]
    pub source_sheet: Option<String>,
    #[serde(default = "default_audit_sheet")]
    pub audit_sheet: String,
    /// Source columns that must all be present, by field key
    #[serde(default = "default_required_source_columns")]
    pub required_source_columns: Vec<String>,
    #[serde(default)]
    pub limits: ScanLimits,
    /// Field key -> header text overrides shared by sources and destinations
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_destinations")]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl SyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Root folder of the sync run; absence is fatal
    pub fn root_folder(&self) -> Result<&Path, SyncError> {
        self.root_folder
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(SyncError::MissingConfiguration("root_folder"))
    }

    /// Webhook URL, `None` when unset or blank
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Header names for source tables
    pub fn source_headers(&self) -> Result<HeaderNames, SyncError> {
        HeaderNames::default().with_overrides(&self.headers)
    }

    /// Header names for one destination sheet (shared overrides, then its own)
    pub fn destination_headers(
        &self,
        destination: &DestinationConfig,
    ) -> Result<HeaderNames, SyncError> {
        self.source_headers()?.with_overrides(&destination.headers)
    }

    pub fn required_source_fields(&self) -> Result<Vec<Field>, SyncError> {
        self.required_source_columns
            .iter()
            .map(|key| {
                Field::from_key(key).ok_or_else(|| {
                    SyncError::InvalidConfiguration(format!(
                        "unknown field '{}' in required_source_columns",
                        key
                    ))
                })
            })
            .collect()
    }

    /// Validate field keys and destination names
    pub fn validate(&self) -> Result<(), SyncError> {
        self.required_source_fields()?;
        self.source_headers()?;
        for destination in &self.destinations {
            if destination.sheet.trim().is_empty() {
                return Err(SyncError::InvalidConfiguration(
                    "destination sheet name is empty".to_string(),
                ));
            }
            self.destination_headers(destination)?;
        }
        if self.limits.blank_streak == 0 {
            return Err(SyncError::InvalidConfiguration(
                "limits.blank_streak must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            master_workbook: default_master_workbook(),
            name_filter: String::new(),
            source_sheet: None,
            audit_sheet: default_audit_sheet(),
            required_source_columns: default_required_source_columns(),
            limits: ScanLimits::default(),
            headers: HashMap::new(),
            destinations: default_destinations(),
            webhook: WebhookConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Destination sheet in the master workbook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub sheet: String,
    /// Header overrides specific to this sheet
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl DestinationConfig {
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Request sheet watched by the notifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_sheet")]
    pub sheet: String,
    #[serde(default = "default_notified_column")]
    pub notified_column: String,
    #[serde(default = "default_notify_title")]
    pub title: String,
    /// Columns copied into the message, in order
    #[serde(default)]
    pub summary_columns: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sheet: default_notify_sheet(),
            notified_column: default_notified_column(),
            title: default_notify_title(),
            summary_columns: Vec::new(),
        }
    }
}

fn default_master_workbook() -> PathBuf {
    PathBuf::from("master.xlsx")
}

fn default_audit_sheet() -> String {
    "Logs".to_string()
}

fn default_required_source_columns() -> Vec<String> {
    Field::ALL.iter().map(|f| f.key().to_string()).collect()
}

fn default_destinations() -> Vec<DestinationConfig> {
    vec![
        DestinationConfig::new("Stores"),
        DestinationConfig::new("Tablets"),
    ]
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_notify_sheet() -> String {
    "Card Requests".to_string()
}

fn default_notified_column() -> String {
    "Notified".to_string()
}

fn default_notify_title() -> String {
    "New business card request".to_string()
}
