//! # Card Composition
//!
//! Positions barcode artwork and header text on a fixed-size card surface.
//!
//! ## Modes
//!
//! - **Single**: one barcode, horizontally centered, either a fixed distance
//!   from the top or centered on the card (see [`SinglePlacement`]).
//! - **Triple**: the card is cut into three equal zones (keychain tags), each
//!   carrying a header caption with a barcode beneath it.
//!
//! ## Keychain Zone Geometry
//!
//! ```text
//! zone_top ──────────────────────────────
//!            (zone_h - bar_h - text_h - spacing) / 2
//!            ┌ header text ┐  text_h
//!                             spacing
//!            ┌── barcode ──┐  bar_h
//!            └─────────────┘
//! zone_top + zone_h ─────────────────────
//! ```
//!
//! All divisions floor towards negative infinity so that boxes wider than
//! the card still land where the printers expect them.
//!
//! Geometry is pure integer arithmetic over the profile constants and the
//! measured header extent: the same inputs always give the same placements.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::barcode::BarcodeImage;
use crate::error::CardError;
use crate::font::{FontSpec, TextMetrics, TextRenderer};
use crate::printer::config::{LayoutProfile, SinglePlacement};

/// Number of keychain tags on a triple card.
pub const ZONE_COUNT: u32 = 3;

/// Which card layout to compose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// One wallet card
    #[default]
    Single,
    /// Three stacked keychain tags
    Triple,
}

impl LayoutMode {
    /// Operator-facing label, also used in the audit log.
    pub fn label(self) -> &'static str {
        match self {
            LayoutMode::Single => "Single Card",
            LayoutMode::Triple => "Triple Keychain",
        }
    }

    /// Spooler document name for this mode.
    pub fn document_name(self) -> &'static str {
        match self {
            LayoutMode::Single => "Codabar Print - Single",
            LayoutMode::Triple => "Codabar Print - Triple",
        }
    }
}

impl FromStr for LayoutMode {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "single card" | "single-card" => Ok(LayoutMode::Single),
            "triple" | "triple keychain" | "triple-keychain" | "keychain" => {
                Ok(LayoutMode::Triple)
            }
            other => Err(CardError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A destination rectangle on the card, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Whether two rectangles share any pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One horizontal band of a keychain card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub top: i32,
    pub height: u32,
}

/// A header caption placed on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPlacement {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font: FontSpec,
}

/// Computed placements for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    pub mode: LayoutMode,
    pub card_width: u32,
    pub card_height: u32,
    /// Keychain zones (empty in single mode)
    pub zones: Vec<Zone>,
    /// Header captions, one per zone
    pub headers: Vec<HeaderPlacement>,
    /// Barcode destinations, in drawing order
    pub barcodes: Vec<Rect>,
}

/// Barcode artwork resized for a mode, ready to lay out on any device.
#[derive(Debug, Clone)]
pub struct CardArtwork {
    pub mode: LayoutMode,
    pub barcode: RgbImage,
}

/// A fully rendered card raster.
#[derive(Debug, Clone)]
pub struct CardSurface {
    pub layout: CardLayout,
    pub raster: RgbImage,
}

impl CardSurface {
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }
}

/// Lays out cards according to one [`LayoutProfile`].
#[derive(Debug, Clone, Default)]
pub struct CardComposer {
    profile: LayoutProfile,
}

impl CardComposer {
    pub fn new(profile: LayoutProfile) -> Self {
        Self { profile }
    }

    /// Font used for keychain headers.
    pub fn header_font(&self) -> FontSpec {
        FontSpec::new(
            self.profile.header_face.clone(),
            self.profile.header_font_px,
            true,
        )
    }

    /// Resize the barcode for `mode`.
    ///
    /// Fails with [`CardError::NoImage`] when no barcode has been generated.
    pub fn prepare(
        &self,
        image: Option<&BarcodeImage>,
        mode: LayoutMode,
    ) -> Result<CardArtwork, CardError> {
        let image = image.ok_or(CardError::NoImage)?;
        let target = match mode {
            LayoutMode::Single => self.profile.single_box,
            LayoutMode::Triple => self.profile.triple_box,
        };
        Ok(CardArtwork {
            mode,
            barcode: image.resized(target.width, target.height),
        })
    }

    /// Compute placements for `mode`, measuring header text with `metrics`.
    pub fn layout(&self, mode: LayoutMode, metrics: &dyn TextMetrics) -> CardLayout {
        match mode {
            LayoutMode::Single => self.single_layout(),
            LayoutMode::Triple => self.triple_layout(metrics),
        }
    }

    fn single_layout(&self) -> CardLayout {
        let (card_w, card_h) = self.profile.card_size();
        let target = self.profile.single_box;

        let left = centered(card_w, target.width);
        let top = match self.profile.single_placement {
            SinglePlacement::TopMargin { margin } => margin as i32,
            SinglePlacement::Centered => centered(card_h, target.height),
        };

        CardLayout {
            mode: LayoutMode::Single,
            card_width: card_w,
            card_height: card_h,
            zones: Vec::new(),
            headers: Vec::new(),
            barcodes: vec![Rect::new(left, top, target.width, target.height)],
        }
    }

    fn triple_layout(&self, metrics: &dyn TextMetrics) -> CardLayout {
        let (card_w, card_h) = self.profile.card_size();
        let target = self.profile.triple_box;
        let spacing = self.profile.header_spacing as i32;
        let font = self.header_font();
        let (text_w, text_h) = metrics.measure(&self.profile.header_text, &font);
        let text_h = text_h as i32;

        let zones = zones(card_h);
        let zone_height = (card_h / ZONE_COUNT) as i32;
        let left = centered(card_w, target.width);
        let text_x = centered(card_w, text_w);

        let mut headers = Vec::with_capacity(zones.len());
        let mut barcodes = Vec::with_capacity(zones.len());

        for zone in &zones {
            let slack = zone_height - target.height as i32 - text_h - spacing;
            let top = zone.top + slack.div_euclid(2) + text_h + spacing;

            headers.push(HeaderPlacement {
                text: self.profile.header_text.clone(),
                x: text_x,
                y: top - spacing - text_h,
                font: font.clone(),
            });
            barcodes.push(Rect::new(left, top, target.width, target.height));
        }

        CardLayout {
            mode: LayoutMode::Triple,
            card_width: card_w,
            card_height: card_h,
            zones,
            headers,
            barcodes,
        }
    }

    /// Render a complete card raster using `text` for header metrics.
    pub fn compose(
        &self,
        image: Option<&BarcodeImage>,
        mode: LayoutMode,
        text: &TextRenderer,
    ) -> Result<CardSurface, CardError> {
        let artwork = self.prepare(image, mode)?;
        let layout = self.layout(mode, text);

        let mut raster = RgbImage::from_pixel(
            layout.card_width,
            layout.card_height,
            Rgb([255, 255, 255]),
        );
        for header in &layout.headers {
            text.draw(&mut raster, &header.text, header.x, header.y, &header.font);
        }
        for rect in &layout.barcodes {
            paste(&mut raster, &artwork.barcode, *rect);
        }

        Ok(CardSurface { layout, raster })
    }
}

/// Split a card into [`ZONE_COUNT`] bands of `height / 3`; the last band
/// absorbs the remainder.
pub fn zones(card_height: u32) -> Vec<Zone> {
    let zone_height = card_height / ZONE_COUNT;
    (0..ZONE_COUNT)
        .map(|i| {
            let height = if i + 1 == ZONE_COUNT {
                card_height - zone_height * (ZONE_COUNT - 1)
            } else {
                zone_height
            };
            Zone {
                top: (i * zone_height) as i32,
                height,
            }
        })
        .collect()
}

/// Offset that centers `inner` within `outer`, flooring.
fn centered(outer: u32, inner: u32) -> i32 {
    (outer as i32 - inner as i32).div_euclid(2)
}

/// Copy `src` into `dst` at `rect`, stretching if sizes differ and clipping
/// to the destination bounds.
pub fn paste(dst: &mut RgbImage, src: &RgbImage, rect: Rect) {
    let stretched;
    let src = if src.dimensions() == (rect.width, rect.height) {
        src
    } else {
        stretched = image::imageops::resize(
            src,
            rect.width,
            rect.height,
            image::imageops::FilterType::Triangle,
        );
        &stretched
    };
    image::imageops::overlay(dst, src, rect.x as i64, rect.y as i64);
}
