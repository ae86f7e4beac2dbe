//! Virtual card printer.
//!
//! Paints each page into a card-sized RGB raster and writes the finished
//! pages as PNG files when the document ends. Aborted documents leave no
//! files behind.

use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{DeviceContext, PrinterDriver};
use crate::error::CardError;
use crate::font::{FontSpec, TextMetrics, TextRenderer};
use crate::layout::{Rect, paste};
use crate::printer::config::LayoutProfile;
use crate::printer::{PrinterIdentity, PrinterScope};

/// Driver for virtual card printers backed by PNG files.
pub struct RasterDriver {
    output_dir: PathBuf,
    printers: Vec<String>,
    page_size: (u32, u32),
    text: Arc<TextRenderer>,
}

impl RasterDriver {
    /// Name of the printer a new driver exposes.
    pub const DEFAULT_PRINTER: &'static str = "Virtual Card Printer";

    /// A driver writing pages into `output_dir`, sized for the local profile.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            printers: vec![Self::DEFAULT_PRINTER.to_string()],
            page_size: LayoutProfile::local().card_size(),
            text: Arc::new(TextRenderer::bitmap()),
        }
    }

    /// Replace the set of printers this driver exposes.
    pub fn with_printers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.printers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Page size in pixels.
    pub fn with_page_size(mut self, width: u32, height: u32) -> Self {
        self.page_size = (width, height);
        self
    }

    /// Text renderer used for metrics and header drawing.
    pub fn with_text(mut self, text: Arc<TextRenderer>) -> Self {
        self.text = text;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn knows(&self, printer: &PrinterIdentity) -> bool {
        let name = printer.as_str();
        self.printers
            .iter()
            .any(|p| p == name || name.rsplit('\\').next() == Some(p.as_str()))
    }
}

impl PrinterDriver for RasterDriver {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn enumerate(&self, scope: &PrinterScope) -> Result<Vec<String>, CardError> {
        Ok(match scope {
            PrinterScope::Local { .. } => self.printers.clone(),
            PrinterScope::Server { server, .. } => self
                .printers
                .iter()
                .map(|p| format!("{}\\{}", server.trim_end_matches('\\'), p))
                .collect(),
        })
    }

    fn open(&self, printer: &PrinterIdentity) -> Result<Box<dyn DeviceContext>, CardError> {
        if !self.knows(printer) {
            return Err(CardError::Connection(format!(
                "Printer not found: {}",
                printer
            )));
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            CardError::Connection(format!(
                "Cannot open output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        Ok(Box::new(RasterDevice {
            printer: printer.clone(),
            output_dir: self.output_dir.clone(),
            page_size: self.page_size,
            text: self.text.clone(),
            document: None,
            page: None,
            pages: Vec::new(),
        }))
    }

    fn status(&self, printer: &PrinterIdentity) -> Result<u32, CardError> {
        if self.knows(printer) {
            Ok(0)
        } else {
            Err(CardError::Connection(format!(
                "Printer not found: {}",
                printer
            )))
        }
    }
}

/// One open virtual printer.
pub struct RasterDevice {
    printer: PrinterIdentity,
    output_dir: PathBuf,
    page_size: (u32, u32),
    text: Arc<TextRenderer>,
    document: Option<String>,
    page: Option<RgbImage>,
    pages: Vec<RgbImage>,
}

impl RasterDevice {
    fn page_mut(&mut self) -> Result<&mut RgbImage, CardError> {
        self.page
            .as_mut()
            .ok_or_else(|| CardError::Draw("No page started".to_string()))
    }

    fn file_stem(&self) -> String {
        let printer: String = self
            .printer
            .display_name()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}-{}", printer, uuid::Uuid::new_v4().simple())
    }
}

impl TextMetrics for RasterDevice {
    fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32) {
        self.text.measure(text, font)
    }
}

impl DeviceContext for RasterDevice {
    fn start_document(&mut self, name: &str) -> Result<(), CardError> {
        if self.document.is_some() {
            return Err(CardError::Draw("Document already started".to_string()));
        }
        debug!(printer = %self.printer, document = name, "Start document");
        self.document = Some(name.to_string());
        self.pages.clear();
        Ok(())
    }

    fn start_page(&mut self) -> Result<(), CardError> {
        if self.document.is_none() {
            return Err(CardError::Draw("No document started".to_string()));
        }
        let (w, h) = self.page_size;
        self.page = Some(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbImage, dest: Rect) -> Result<(), CardError> {
        paste(self.page_mut()?, image, dest);
        Ok(())
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: &FontSpec) -> Result<(), CardError> {
        let renderer = self.text.clone();
        renderer.draw(self.page_mut()?, text, x, y, font);
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), CardError> {
        let page = self
            .page
            .take()
            .ok_or_else(|| CardError::Draw("No page started".to_string()))?;
        self.pages.push(page);
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), CardError> {
        let name = self
            .document
            .take()
            .ok_or_else(|| CardError::Draw("No document started".to_string()))?;
        let stem = self.file_stem();
        for (i, page) in self.pages.drain(..).enumerate() {
            let path = self.output_dir.join(format!("{}-p{}.png", stem, i + 1));
            page.save(&path)
                .map_err(|e| CardError::Draw(format!("Failed to save {}: {}", path.display(), e)))?;
            info!(printer = %self.printer, document = %name, path = %path.display(), "Page written");
        }
        Ok(())
    }

    fn abort_document(&mut self) -> Result<(), CardError> {
        self.document = None;
        self.page = None;
        self.pages.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.page = None;
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_unknown_printer_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RasterDriver::new(dir.path());
        let result = driver.open(&PrinterIdentity::new("Nope"));
        assert!(matches!(result, Err(CardError::Connection(_))));
        assert!(driver.status(&PrinterIdentity::new("Nope")).is_err());
    }

    #[test]
    fn test_document_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RasterDriver::new(dir.path());
        let mut device = driver
            .open(&PrinterIdentity::new(RasterDriver::DEFAULT_PRINTER))
            .unwrap();

        device.start_document("doc").unwrap();
        device.start_page().unwrap();
        device
            .draw_image(&RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])), Rect::new(5, 5, 10, 10))
            .unwrap();
        device.end_page().unwrap();
        device.end_document().unwrap();
        device.release();

        assert_eq!(png_count(dir.path()), 1);
    }

    #[test]
    fn test_each_document_gets_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RasterDriver::new(dir.path()).with_printers(["Card Printer 1"]);
        for _ in 0..2 {
            let mut device = driver.open(&PrinterIdentity::new("Card Printer 1")).unwrap();
            device.start_document("doc").unwrap();
            device.start_page().unwrap();
            device.end_page().unwrap();
            device.end_document().unwrap();
            device.release();
        }

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        for name in &names {
            assert!(name.starts_with("Card-Printer-1-"));
            assert!(name.ends_with("-p1.png"));
        }
    }

    #[test]
    fn test_aborted_document_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RasterDriver::new(dir.path());
        let mut device = driver
            .open(&PrinterIdentity::new(RasterDriver::DEFAULT_PRINTER))
            .unwrap();

        device.start_document("doc").unwrap();
        device.start_page().unwrap();
        device.abort_document().unwrap();
        device.release();

        assert_eq!(png_count(dir.path()), 0);
    }

    #[test]
    fn test_draw_without_page_fails() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RasterDriver::new(dir.path());
        let mut device = driver
            .open(&PrinterIdentity::new(RasterDriver::DEFAULT_PRINTER))
            .unwrap();
        let err = device
            .draw_text("x", 0, 0, &FontSpec::new("Arial", 20, false))
            .unwrap_err();
        assert!(matches!(err, CardError::Draw(_)));
        assert!(matches!(device.start_page(), Err(CardError::Draw(_))));
    }

    #[test]
    fn test_server_scope_qualifies_names() {
        let driver = RasterDriver::new("unused").with_printers(["Card Printer 1", "Laser"]);
        let names = driver
            .enumerate(&PrinterScope::Server {
                server: "\\\\printserver".to_string(),
                filter: "card printer".to_string(),
            })
            .unwrap();
        assert_eq!(
            names,
            vec!["\\\\printserver\\Card Printer 1", "\\\\printserver\\Laser"]
        );
        assert!(driver.knows(&PrinterIdentity::new("\\\\printserver\\Card Printer 1")));
    }
}
