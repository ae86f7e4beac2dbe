//! # Text Rendering
//!
//! Renders captions and card headers into anti-aliased coverage buffers.
//!
//! Two backends are available:
//!
//! - **TTF**: fonts loaded at runtime with `ab_glyph` from configured paths
//! - **Bitmap**: the embedded Spleen 12×24 font, scaled to the requested height
//!
//! A missing or unreadable TTF file is never fatal: the renderer falls back to
//! the bitmap font and logs a warning.
//!
//! Placement code never measures text itself. It asks a [`TextMetrics`]
//! implementation, which is either this renderer (for raster output) or the
//! printer's device context (for GDI output), so header spacing adapts to
//! whatever font the output device actually substitutes.

use ab_glyph::{Font, FontArc, ScaleFont};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use spleen_font::{FONT_12X24, PSF2Font};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Native cell size of the embedded bitmap font.
const BITMAP_CELL_WIDTH: u32 = 12;
const BITMAP_CELL_HEIGHT: u32 = 24;

/// Requested font for a run of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSpec {
    /// Face name requested from the output device (e.g. "Arial")
    pub face: String,
    /// Cell height in pixels
    pub pixel_height: u32,
    /// Bold weight
    pub bold: bool,
}

impl FontSpec {
    pub fn new(face: impl Into<String>, pixel_height: u32, bold: bool) -> Self {
        Self {
            face: face.into(),
            pixel_height,
            bold,
        }
    }
}

/// Anything that can report the pixel extent of a text run.
pub trait TextMetrics {
    /// Width and height in pixels of `text` set in `font`.
    fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32);
}

/// Optional TTF font files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontPaths {
    pub regular: Option<PathBuf>,
    pub bold: Option<PathBuf>,
}

/// Rendered text as an anti-aliased coverage buffer.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub width: u32,
    pub height: u32,
    /// Intensity values: 0.0 = paper, 1.0 = ink.
    pub data: Vec<f32>,
}

impl GlyphRun {
    fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        }
    }

    fn accumulate(&mut self, x: i32, y: i32, coverage: f32) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            self.data[idx] = (self.data[idx] + coverage).min(1.0);
        }
    }

    /// Double-strike the run one pixel to the right.
    fn embolden(&mut self) {
        let w = self.width as usize;
        for row in self.data.chunks_mut(w) {
            for x in (1..w).rev() {
                row[x] = row[x].max(row[x - 1]);
            }
        }
    }
}

enum Typeface {
    Ttf {
        regular: FontArc,
        bold: Option<FontArc>,
    },
    Bitmap,
}

/// Text renderer with TTF support and a bitmap fallback.
pub struct TextRenderer {
    face: Typeface,
}

impl TextRenderer {
    /// Renderer backed only by the embedded bitmap font.
    pub fn bitmap() -> Self {
        Self {
            face: Typeface::Bitmap,
        }
    }

    /// Load the configured TTF fonts, falling back to the bitmap font.
    pub fn load(paths: &FontPaths) -> Self {
        let Some(regular_path) = paths.regular.as_deref() else {
            debug!("No TTF font configured, using bitmap font");
            return Self::bitmap();
        };

        let regular = match load_ttf(regular_path) {
            Ok(font) => font,
            Err(e) => {
                warn!(path = %regular_path.display(), error = %e, "Font unavailable, using bitmap font");
                return Self::bitmap();
            }
        };

        let bold = paths.bold.as_deref().and_then(|path| match load_ttf(path) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Bold font unavailable, emulating bold");
                None
            }
        });

        Self {
            face: Typeface::Ttf { regular, bold },
        }
    }

    /// Whether the bitmap fallback is in use.
    pub fn is_fallback(&self) -> bool {
        matches!(self.face, Typeface::Bitmap)
    }

    /// Render text to a coverage buffer.
    pub fn render(&self, text: &str, font: &FontSpec) -> GlyphRun {
        match &self.face {
            Typeface::Ttf { regular, bold } => {
                let (face, synthetic_bold) = match (font.bold, bold) {
                    (true, Some(b)) => (b, false),
                    (true, None) => (regular, true),
                    (false, _) => (regular, false),
                };
                render_ttf(face, text, font.pixel_height as f32, synthetic_bold)
            }
            Typeface::Bitmap => render_bitmap(text, font.pixel_height, font.bold),
        }
    }

    /// Draw text in black onto an RGB image with its top-left corner at (x, y).
    pub fn draw(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, font: &FontSpec) {
        let run = self.render(text, font);
        blit_coverage(image, &run, x, y);
    }
}

impl TextMetrics for TextRenderer {
    fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32) {
        match &self.face {
            Typeface::Ttf { regular, bold } => {
                let (face, extra) = match (font.bold, bold) {
                    (true, Some(b)) => (b, 0),
                    (true, None) => (regular, 1),
                    (false, _) => (regular, 0),
                };
                let (w, h) = ttf_extent(face, text, font.pixel_height as f32);
                (w + extra, h)
            }
            Typeface::Bitmap => bitmap_extent(text, font.pixel_height, font.bold),
        }
    }
}

/// Composite a coverage buffer onto an image, darkening towards black.
pub fn blit_coverage(image: &mut RgbImage, run: &GlyphRun, x: i32, y: i32) {
    for gy in 0..run.height {
        for gx in 0..run.width {
            let coverage = run.data[(gy * run.width + gx) as usize];
            if coverage <= 0.0 {
                continue;
            }
            let px = x + gx as i32;
            let py = y + gy as i32;
            if px < 0 || py < 0 || px as u32 >= image.width() || py as u32 >= image.height() {
                continue;
            }
            let Rgb([r, g, b]) = *image.get_pixel(px as u32, py as u32);
            let keep = 1.0 - coverage;
            image.put_pixel(
                px as u32,
                py as u32,
                Rgb([
                    (r as f32 * keep).round() as u8,
                    (g as f32 * keep).round() as u8,
                    (b as f32 * keep).round() as u8,
                ]),
            );
        }
    }
}

fn load_ttf(path: &Path) -> Result<FontArc, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    FontArc::try_from_vec(bytes).map_err(|e| e.to_string())
}

fn ttf_extent(font: &FontArc, text: &str, pixel_height: f32) -> (u32, u32) {
    let scaled = font.as_scaled(pixel_height);
    let width: f32 = text.chars().map(|ch| scaled.h_advance(font.glyph_id(ch))).sum();
    let height = (scaled.ascent() - scaled.descent()).ceil();
    (width.ceil().max(1.0) as u32, height.max(1.0) as u32)
}

fn render_ttf(font: &FontArc, text: &str, pixel_height: f32, synthetic_bold: bool) -> GlyphRun {
    let scaled = font.as_scaled(pixel_height);
    let (text_width, height) = ttf_extent(font, text, pixel_height);
    let width = text_width + u32::from(synthetic_bold);
    let baseline_y = scaled.ascent();

    let mut run = GlyphRun::blank(width, height);
    let mut caret_x = 0.0f32;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        let glyph =
            glyph_id.with_scale_and_position(pixel_height, ab_glyph::point(caret_x, baseline_y));
        caret_x += scaled.h_advance(glyph_id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                run.accumulate(
                    px as i32 + bounds.min.x as i32,
                    py as i32 + bounds.min.y as i32,
                    coverage,
                );
            });
        }
    }

    if synthetic_bold {
        run.embolden();
    }
    run
}

/// Character cell size of the bitmap font scaled to `pixel_height`.
fn bitmap_cell(pixel_height: u32) -> (u32, u32) {
    let height = pixel_height.max(1);
    let width = (BITMAP_CELL_WIDTH * height).div_ceil(BITMAP_CELL_HEIGHT).max(1);
    (width, height)
}

fn bitmap_extent(text: &str, pixel_height: u32, bold: bool) -> (u32, u32) {
    let (cell_w, cell_h) = bitmap_cell(pixel_height);
    let chars = text.chars().count() as u32;
    ((cell_w * chars).max(1) + u32::from(bold), cell_h)
}

fn render_bitmap(text: &str, pixel_height: u32, bold: bool) -> GlyphRun {
    let (width, height) = bitmap_extent(text, pixel_height, bold);
    let (cell_w, cell_h) = bitmap_cell(pixel_height);
    let mut run = GlyphRun::blank(width, height);

    let Ok(mut spleen) = PSF2Font::new(FONT_12X24) else {
        warn!("Embedded bitmap font failed to load");
        return run;
    };

    for (i, ch) in text.chars().enumerate() {
        let mut cell = vec![false; (BITMAP_CELL_WIDTH * BITMAP_CELL_HEIGHT) as usize];
        let utf8 = ch.to_string();
        match spleen.glyph_for_utf8(utf8.as_bytes()) {
            Some(glyph) => {
                for (row_y, row) in glyph.enumerate() {
                    for (col_x, on) in row.enumerate() {
                        let idx = row_y * BITMAP_CELL_WIDTH as usize + col_x;
                        if idx < cell.len() {
                            cell[idx] = on;
                        }
                    }
                }
            }
            None if !ch.is_whitespace() => draw_box(&mut cell),
            None => {}
        }

        // Nearest-neighbour scale into the destination cell
        let origin_x = i as u32 * cell_w;
        for dy in 0..cell_h {
            for dx in 0..cell_w {
                let sx = dx * BITMAP_CELL_WIDTH / cell_w;
                let sy = dy * BITMAP_CELL_HEIGHT / cell_h;
                if cell[(sy * BITMAP_CELL_WIDTH + sx) as usize] {
                    run.accumulate((origin_x + dx) as i32, dy as i32, 1.0);
                }
            }
        }
    }

    if bold {
        run.embolden();
    }
    run
}

/// Outline box used for characters the bitmap font lacks.
fn draw_box(cell: &mut [bool]) {
    let w = BITMAP_CELL_WIDTH as usize;
    let h = BITMAP_CELL_HEIGHT as usize;
    for x in 0..w {
        cell[x] = true;
        cell[(h - 1) * w + x] = true;
    }
    for y in 0..h {
        cell[y * w] = true;
        cell[y * w + w - 1] = true;
    }
}
