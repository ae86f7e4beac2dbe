//! # Card Layout Profiles
//!
//! This module defines the numeric constants that position artwork on a
//! physical card. Deployments differ only in these numbers, never in the
//! placement algorithm, so each deployment is one [`LayoutProfile`].
//!
//! ## Built-in Profiles
//!
//! | Name | Card (px) | Single box | Single placement | Triple box | Header |
//! |------|-----------|------------|------------------|------------|--------|
//! | `local` | 637×1012 | 600×180 | top margin 20 | 650×180 | 44 px |
//! | `network` | 637×1012 | 600×180 | top margin 20 | 630×160 | 40 px |
//! | `full-card` | 1012×637 | 600×180 | centered | 600×180 | 44 px |
//!
//! ## Calculations
//!
//! ```text
//! card_px = trunc(inches * dpi)
//!
//! For a CR80 card at 300 DPI:
//!   2.125 in * 300 = 637.5 → 637
//!   3.375 in * 300 = 1012.5 → 1012
//! ```

use serde::{Deserialize, Serialize};

/// Physical CR80 card short edge in inches.
pub const CARD_SHORT_IN: f32 = 2.125;
/// Physical CR80 card long edge in inches.
pub const CARD_LONG_IN: f32 = 3.375;
/// Working resolution of the card printers.
pub const CARD_DPI: u32 = 300;

/// Caption printed above each keychain barcode.
pub const DEFAULT_HEADER: &str = "reginalibrary.ca | sasklibraries.ca";

/// Card orientation convention used when sizing the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Short edge horizontal
    #[default]
    Portrait,
    /// Long edge horizontal
    Landscape,
}

/// Where the single-card barcode goes vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinglePlacement {
    /// Fixed distance from the top edge
    TopMargin { margin: u32 },
    /// Centered on the whole card
    Centered,
}

/// Target size a barcode is stretched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: u32,
    pub height: u32,
}

impl BoxSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// # Layout Profile
///
/// All the constants one deployment uses to compose a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutProfile {
    /// Profile name (e.g. "local")
    pub name: String,
    /// Resolution in dots per inch
    pub dpi: u32,
    /// Surface orientation
    pub orientation: Orientation,
    /// Single-card barcode box
    pub single_box: BoxSize,
    /// Single-card vertical placement policy
    pub single_placement: SinglePlacement,
    /// Keychain barcode box
    pub triple_box: BoxSize,
    /// Keychain header caption
    pub header_text: String,
    /// Keychain header font face
    pub header_face: String,
    /// Keychain header font height in pixels
    pub header_font_px: u32,
    /// Gap between header bottom and barcode top
    pub header_spacing: u32,
}

impl LayoutProfile {
    /// Locally attached card printer.
    pub fn local() -> Self {
        Self {
            name: "local".to_string(),
            dpi: CARD_DPI,
            orientation: Orientation::Portrait,
            single_box: BoxSize::new(600, 180),
            single_placement: SinglePlacement::TopMargin { margin: 20 },
            triple_box: BoxSize::new(650, 180),
            header_text: DEFAULT_HEADER.to_string(),
            header_face: "Arial".to_string(),
            header_font_px: 44,
            header_spacing: 15,
        }
    }

    /// Card printers shared from a print server.
    pub fn network() -> Self {
        Self {
            name: "network".to_string(),
            triple_box: BoxSize::new(630, 160),
            header_font_px: 40,
            ..Self::local()
        }
    }

    /// Landscape layout with the single barcode centered on the full card.
    pub fn full_card() -> Self {
        Self {
            name: "full-card".to_string(),
            orientation: Orientation::Landscape,
            single_placement: SinglePlacement::Centered,
            triple_box: BoxSize::new(600, 180),
            ..Self::local()
        }
    }

    /// Card surface size in pixels (width, height).
    pub fn card_size(&self) -> (u32, u32) {
        let short = (CARD_SHORT_IN * self.dpi as f32) as u32;
        let long = (CARD_LONG_IN * self.dpi as f32) as u32;
        match self.orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }

    /// Parse a built-in profile name.
    pub fn parse(s: &str) -> Result<Self, String> {
        Self::built_in()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown profile '{}'. Use one of: {}",
                    s,
                    Self::built_in()
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }

    /// List all built-in profiles.
    pub fn built_in() -> Vec<Self> {
        vec![Self::local(), Self::network(), Self::full_card()]
    }
}

impl Default for LayoutProfile {
    fn default() -> Self {
        Self::local()
    }
}

// ============================================================================
// TESTS
// ============================================================================
