//! # Barcode Rendering
//!
//! Turns an [`AccountNumber`] into a Codabar raster with the plain number
//! captioned beneath the bars.
//!
//! Symbol encoding is delegated to the `barcoders` crate; this module only
//! scales the module pattern into pixels and lays out the caption.
//!
//! ## Image Layout
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ quiet ▌▌ ▌▌▌ ▌ ▌▌  ▌ quiet   │  bar_height
//! │                              │  caption_gap
//! │        12345678901234        │  caption height
//! │                              │  bottom padding (to total + 50)
//! └──────────────────────────────┘
//! ```

use barcoders::sym::codabar::Codabar;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::sync::Arc;

use crate::account::AccountNumber;
use crate::error::CardError;
use crate::font::{FontSpec, TextMetrics, TextRenderer};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Pixel geometry of the generated barcode image.
#[derive(Debug, Clone)]
pub struct BarcodeStyle {
    /// Width of one narrow module in pixels
    pub module_width: u32,
    /// Height of the bars in pixels
    pub bar_height: u32,
    /// Blank modules on each side of the symbol
    pub quiet_zone: u32,
    /// Font for the human-readable caption
    pub caption_font: FontSpec,
    /// Space between the bars and the caption
    pub caption_gap: u32,
    /// Extra height added below the bars and caption
    pub bottom_padding: u32,
}

impl Default for BarcodeStyle {
    fn default() -> Self {
        Self {
            module_width: 3,
            bar_height: 150,
            quiet_zone: 10,
            caption_font: FontSpec::new("Arial", 60, false),
            caption_gap: 10,
            bottom_padding: 50,
        }
    }
}

/// A rendered barcode with its caption.
///
/// Never mutated after creation; resizing produces new rasters.
#[derive(Debug, Clone)]
pub struct BarcodeImage {
    account: AccountNumber,
    raster: RgbImage,
}

impl BarcodeImage {
    /// Wrap an existing raster (used by tests and pre-rendered artwork).
    pub fn from_raster(account: AccountNumber, raster: RgbImage) -> Self {
        Self { account, raster }
    }

    pub fn account(&self) -> &AccountNumber {
        &self.account
    }

    pub fn raster(&self) -> &RgbImage {
        &self.raster
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// A new raster stretched to exactly `width` × `height`.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        image::imageops::resize(&self.raster, width, height, FilterType::Lanczos3)
    }
}

/// Encode a Codabar payload into modules.
/// Returns a Vec<bool> where true = bar (black), false = space (white).
///
/// The payload must carry its own start/stop characters (A-D).
pub fn encode_codabar(payload: &str) -> Result<Vec<bool>, CardError> {
    let barcode = Codabar::new(payload)
        .map_err(|e| CardError::Render(format!("Codabar encoding failed: {:?}", e)))?;
    Ok(barcode.encode().into_iter().map(|module| module == 1).collect())
}

/// Render the Codabar symbol for `account` with its caption.
pub fn render(
    account: &AccountNumber,
    style: &BarcodeStyle,
    text: &TextRenderer,
) -> Result<Arc<BarcodeImage>, CardError> {
    let modules = encode_codabar(&account.codabar_payload())?;
    if modules.is_empty() {
        return Err(CardError::Render("Codabar produced no modules".to_string()));
    }

    let module_w = style.module_width.max(1);
    let bars_width = (modules.len() as u32 + 2 * style.quiet_zone) * module_w;
    let (caption_w, caption_h) = text.measure(account.as_str(), &style.caption_font);
    let total_height = style.bar_height + caption_h + style.bottom_padding;

    let mut raster = RgbImage::from_pixel(bars_width, total_height, WHITE);

    for (i, &is_bar) in modules.iter().enumerate() {
        if !is_bar {
            continue;
        }
        let x0 = (style.quiet_zone + i as u32) * module_w;
        for x in x0..x0 + module_w {
            for y in 0..style.bar_height {
                raster.put_pixel(x, y, BLACK);
            }
        }
    }

    let caption_x = (bars_width as i32 - caption_w as i32) / 2;
    let caption_y = (style.bar_height + style.caption_gap) as i32;
    text.draw(
        &mut raster,
        account.as_str(),
        caption_x,
        caption_y,
        &style.caption_font,
    );

    Ok(Arc::new(BarcodeImage {
        account: account.clone(),
        raster,
    }))
}
