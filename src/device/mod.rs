//! # Printer Device Layer
//!
//! This module provides the page-level drawing surface that print jobs talk
//! to, and the drivers that open it.
//!
//! ## Available Drivers
//!
//! - [`raster`]: virtual card printer that writes each page to a PNG file
//! - [`gdi`]: Windows GDI device contexts (Windows only)
//!
//! ## Scoped Connections
//!
//! Drivers hand out raw [`DeviceContext`]s. Callers always wrap them in a
//! [`PrinterConnection`], which tracks whether a document is open and, on
//! every exit path, aborts an unfinished document before releasing the OS
//! handle.

#[cfg(windows)]
pub mod gdi;
pub mod raster;

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::CardError;
use crate::font::{FontSpec, TextMetrics};
use crate::layout::Rect;
use crate::printer::{PrinterIdentity, PrinterScope};

#[cfg(windows)]
pub use gdi::GdiDriver;
pub use raster::RasterDriver;

/// Page-level drawing primitives of an open printer.
///
/// Implementations report mid-document failures as [`CardError::Draw`].
pub trait DeviceContext: TextMetrics + Send {
    fn start_document(&mut self, name: &str) -> Result<(), CardError>;
    fn start_page(&mut self) -> Result<(), CardError>;
    fn draw_image(&mut self, image: &RgbImage, dest: Rect) -> Result<(), CardError>;
    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: &FontSpec) -> Result<(), CardError>;
    fn end_page(&mut self) -> Result<(), CardError>;
    fn end_document(&mut self) -> Result<(), CardError>;
    /// Discard the current document.
    fn abort_document(&mut self) -> Result<(), CardError>;
    /// Release the OS handle. Called exactly once.
    fn release(&mut self);
}

/// A source of printers: enumeration, connections and status.
pub trait PrinterDriver: Send + Sync {
    /// Short driver name for logs
    fn name(&self) -> &'static str;

    /// Fully qualified names of the printers visible in `scope`.
    fn enumerate(&self, scope: &PrinterScope) -> Result<Vec<String>, CardError>;

    /// Open a device context.
    ///
    /// Fails with [`CardError::Connection`] when the printer cannot be opened.
    fn open(&self, printer: &PrinterIdentity) -> Result<Box<dyn DeviceContext>, CardError>;

    /// Raw device status bits.
    fn status(&self, printer: &PrinterIdentity) -> Result<u32, CardError>;
}

/// A scoped connection to one printer.
///
/// ## Example
///
/// ```
/// use cardpress::device::{PrinterConnection, RasterDriver};
/// use cardpress::printer::PrinterIdentity;
///
/// let dir = std::env::temp_dir().join("cardpress-doc");
/// let driver = RasterDriver::new(&dir);
/// let printer = PrinterIdentity::new(RasterDriver::DEFAULT_PRINTER);
///
/// let mut conn = PrinterConnection::open(&driver, &printer)?;
/// conn.start_document("Codabar Print - Single")?;
/// conn.start_page()?;
/// conn.end_page()?;
/// conn.end_document()?;
/// conn.close();
/// # Ok::<(), cardpress::CardError>(())
/// ```
pub struct PrinterConnection {
    printer: PrinterIdentity,
    device: Box<dyn DeviceContext>,
    document_open: bool,
    released: bool,
}

impl PrinterConnection {
    /// Open a connection through `driver`.
    pub fn open(driver: &dyn PrinterDriver, printer: &PrinterIdentity) -> Result<Self, CardError> {
        debug!(driver = driver.name(), printer = %printer, "Opening printer");
        let device = driver.open(printer)?;
        Ok(Self::from_device(printer.clone(), device))
    }

    /// Wrap an already opened device context.
    pub fn from_device(printer: PrinterIdentity, device: Box<dyn DeviceContext>) -> Self {
        Self {
            printer,
            device,
            document_open: false,
            released: false,
        }
    }

    pub fn printer(&self) -> &PrinterIdentity {
        &self.printer
    }

    /// Whether a document was started and not yet ended or aborted.
    pub fn is_document_open(&self) -> bool {
        self.document_open
    }

    pub fn start_document(&mut self, name: &str) -> Result<(), CardError> {
        self.device.start_document(name)?;
        self.document_open = true;
        Ok(())
    }

    pub fn start_page(&mut self) -> Result<(), CardError> {
        self.device.start_page()
    }

    pub fn draw_image(&mut self, image: &RgbImage, dest: Rect) -> Result<(), CardError> {
        self.device.draw_image(image, dest)
    }

    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, font: &FontSpec) -> Result<(), CardError> {
        self.device.draw_text(text, x, y, font)
    }

    pub fn end_page(&mut self) -> Result<(), CardError> {
        self.device.end_page()
    }

    /// Commit the document.
    ///
    /// The document counts as closed even if the commit fails, so it is
    /// never aborted after the spooler has taken it.
    pub fn end_document(&mut self) -> Result<(), CardError> {
        self.document_open = false;
        self.device.end_document()
    }

    /// Abort the current document if one is open. Errors are ignored.
    pub fn abort_if_open(&mut self) {
        if !self.document_open {
            return;
        }
        self.document_open = false;
        if let Err(e) = self.device.abort_document() {
            warn!(printer = %self.printer, error = %e, "Abort document failed");
        } else {
            debug!(printer = %self.printer, "Document aborted");
        }
    }

    /// Abort any unfinished document and release the handle.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.abort_if_open();
        self.device.release();
        self.released = true;
        debug!(printer = %self.printer, "Printer released");
    }
}

impl TextMetrics for PrinterConnection {
    fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32) {
        self.device.measure(text, font)
    }
}

impl Drop for PrinterConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
