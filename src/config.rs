//! # Application Configuration
//!
//! Optional JSON file; every field has a default.
//!
//! ```json
//! {
//!   "profile": "network",
//!   "timeout_secs": 15,
//!   "settle_ms": 1500,
//!   "audit_log": "print_log.txt",
//!   "failure_reporting": "honest",
//!   "printers": { "kind": "server", "server": "\\\\printserver", "filter": "card printer" },
//!   "fonts": { "regular": "C:\\Windows\\Fonts\\arial.ttf", "bold": "C:\\Windows\\Fonts\\arialbd.ttf" },
//!   "output_dir": "cards"
//! }
//! ```
//!
//! `profile` is either a built-in profile name or a full inline
//! [`LayoutProfile`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::CardError;
use crate::font::FontPaths;
use crate::job::{FailureReporting, JobConfig};
use crate::printer::PrinterScope;
use crate::printer::config::LayoutProfile;

/// Layout profile reference: a built-in name or inline constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileRef {
    Named(String),
    Inline(Box<LayoutProfile>),
}

impl Default for ProfileRef {
    fn default() -> Self {
        ProfileRef::Named("local".to_string())
    }
}

impl ProfileRef {
    /// Resolve to concrete layout constants.
    pub fn resolve(&self) -> Result<LayoutProfile, CardError> {
        match self {
            ProfileRef::Named(name) => LayoutProfile::parse(name).map_err(CardError::Config),
            ProfileRef::Inline(profile) => Ok((**profile).clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: ProfileRef,
    pub timeout_secs: u64,
    pub settle_ms: u64,
    pub audit_log: PathBuf,
    pub failure_reporting: FailureReporting,
    pub printers: PrinterScope,
    pub fonts: FontPaths,
    /// Where the raster driver writes card images
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: ProfileRef::default(),
            timeout_secs: 15,
            settle_ms: 1500,
            audit_log: PathBuf::from("print_log.txt"),
            failure_reporting: FailureReporting::Honest,
            printers: PrinterScope::Local {
                filter: Some("card printer".to_string()),
            },
            fonts: FontPaths::default(),
            output_dir: PathBuf::from("cards"),
        }
    }
}

impl AppConfig {
    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CardError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CardError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text)
            .map_err(|e| CardError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CardError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn layout_profile(&self) -> Result<LayoutProfile, CardError> {
        self.profile.resolve()
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            settle: Duration::from_millis(self.settle_ms),
            reporting: self.failure_reporting,
        }
    }
}
