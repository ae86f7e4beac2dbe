//! # Printer Health
//!
//! Maps device status bits to a three-level health indicator.
//!
//! | Health | Matched words in the flag text | Colour |
//! |--------|-------------------------------|--------|
//! | Red | error, offline, jam, punt | red |
//! | Amber | paused, waiting, processing | orange |
//! | Green | anything else (or no flags: "Ready") | green |
//! | Unknown | status could not be queried | gray |
//!
//! Severity is decided by substring match against the assembled,
//! comma-joined flag names, highest tier first.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::PrinterIdentity;
use crate::device::PrinterDriver;

/// Spooler printer status bits and their names.
pub const STATUS_FLAGS: [(u32, &str); 26] = [
    (0x0000_0001, "Paused"),
    (0x0000_0002, "Error"),
    (0x0000_0004, "Deleting"),
    (0x0000_0008, "Paper Jam"),
    (0x0000_0010, "Paper Out"),
    (0x0000_0020, "Manual Feed"),
    (0x0000_0040, "Paper Problem"),
    (0x0000_0080, "Offline"),
    (0x0000_0100, "IO Active"),
    (0x0000_0200, "Busy"),
    (0x0000_0400, "Printing"),
    (0x0000_0800, "Output Bin Full"),
    (0x0000_1000, "Not Available"),
    (0x0000_2000, "Waiting"),
    (0x0000_4000, "Processing"),
    (0x0000_8000, "Initializing"),
    (0x0001_0000, "Warming Up"),
    (0x0002_0000, "Toner Low"),
    (0x0004_0000, "No Toner"),
    (0x0008_0000, "Page Punt"),
    (0x0010_0000, "User Intervention"),
    (0x0020_0000, "Out of Memory"),
    (0x0040_0000, "Door Open"),
    (0x0080_0000, "Server Unknown"),
    (0x0100_0000, "Power Save"),
    (0x0200_0000, "Server Offline"),
];

const RED_WORDS: [&str; 4] = ["error", "offline", "jam", "punt"];
const AMBER_WORDS: [&str; 3] = ["paused", "waiting", "processing"];

/// Health tier of a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Health {
    Unknown,
    Green,
    Amber,
    Red,
}

impl Health {
    /// Indicator colour name.
    pub fn color(self) -> &'static str {
        match self {
            Health::Red => "red",
            Health::Amber => "orange",
            Health::Green => "green",
            Health::Unknown => "gray",
        }
    }
}

/// Health tier plus the human-readable flag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthState {
    pub health: Health,
    pub text: String,
}

impl HealthState {
    pub fn unknown() -> Self {
        Self {
            health: Health::Unknown,
            text: "Unknown".to_string(),
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "● {} ({})", self.text, self.health.color())
    }
}

/// Classify raw status bits.
pub fn classify(status: u32) -> HealthState {
    let names: Vec<&str> = STATUS_FLAGS
        .iter()
        .filter(|(bit, _)| status & bit != 0)
        .map(|(_, name)| *name)
        .collect();

    let text = if names.is_empty() {
        "Ready".to_string()
    } else {
        names.join(", ")
    };

    let lower = text.to_lowercase();
    let health = if RED_WORDS.iter().any(|w| lower.contains(w)) {
        Health::Red
    } else if AMBER_WORDS.iter().any(|w| lower.contains(w)) {
        Health::Amber
    } else {
        Health::Green
    };

    HealthState { health, text }
}

/// Polls printer status through a driver.
#[derive(Clone)]
pub struct PrinterStatusMonitor {
    driver: Arc<dyn PrinterDriver>,
}

impl PrinterStatusMonitor {
    pub fn new(driver: Arc<dyn PrinterDriver>) -> Self {
        Self { driver }
    }

    /// Query one printer. Never fails: unreachable printers are `Unknown`.
    pub fn query(&self, printer: &PrinterIdentity) -> HealthState {
        match self.driver.status(printer) {
            Ok(bits) => {
                let state = classify(bits);
                debug!(printer = %printer, bits = format_args!("{:#010x}", bits), status = %state.text, "Printer status");
                state
            }
            Err(e) => {
                warn!(printer = %printer, error = %e, "Printer status unavailable");
                HealthState::unknown()
            }
        }
    }
}
