//! # Printer Module
//!
//! This module provides printer identities, name resolution and
//! printer-specific layout constants.
//!
//! ## Modules
//!
//! - [`config`]: Card geometry per deployment
//! - [`directory`]: Display name → printer identity map
//! - [`status`]: Device status bits → health colour

pub mod config;
pub mod directory;
pub mod status;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use config::LayoutProfile;
pub use directory::PrinterDirectory;
pub use status::{Health, HealthState, PrinterStatusMonitor};

/// A fully qualified OS printer name (e.g. `\\printserver\Card Printer 2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterIdentity(String);

impl PrinterIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short name shown to operators: the last `\`-separated segment.
    pub fn display_name(&self) -> &str {
        self.0.rsplit('\\').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for PrinterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where printers are enumerated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrinterScope {
    /// Printers installed on this machine
    Local {
        #[serde(default)]
        filter: Option<String>,
    },
    /// Printers shared from a print server, filtered by name substring
    Server { server: String, filter: String },
}

impl PrinterScope {
    /// Case-insensitive substring a printer name must contain, if any.
    pub fn filter(&self) -> Option<&str> {
        match self {
            PrinterScope::Local { filter } => filter.as_deref(),
            PrinterScope::Server { filter, .. } => Some(filter),
        }
    }
}

impl Default for PrinterScope {
    fn default() -> Self {
        PrinterScope::Local { filter: None }
    }
}
