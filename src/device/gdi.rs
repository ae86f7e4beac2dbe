//! Windows GDI printer driver.
//!
//! Opens a printer device context through the spooler, draws barcode rasters
//! with `StretchDIBits` and headers with `TextOutW`. Enumeration and status
//! go through the print spooler API.

use std::mem::size_of;
use tracing::{debug, instrument, warn};
use windows::Win32::Foundation::{GetLastError, SIZE};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, CLIP_DEFAULT_PRECIS, CreateDCW, CreateFontW,
    DEFAULT_CHARSET, DEFAULT_PITCH, DEFAULT_QUALITY, DEVMODEW, DIB_RGB_COLORS, DM_ORIENTATION,
    DeleteDC, DeleteObject, GetTextExtentPoint32W, HDC, HFONT, HGDIOBJ, OUT_DEFAULT_PRECIS,
    SRCCOPY, SelectObject, SetBkMode, StretchDIBits, TRANSPARENT, TextOutW,
};
use windows::Win32::Graphics::Printing::{
    ClosePrinter, DocumentPropertiesW, EnumPrintersW, GetPrinterW, OpenPrinterW,
    PRINTER_ENUM_LOCAL, PRINTER_ENUM_NAME, PRINTER_HANDLE, PRINTER_INFO_4W, PRINTER_INFO_6,
};
use windows::Win32::Storage::Xps::DOCINFOW;
use windows::core::{PCWSTR, PWSTR, w};

use image::RgbImage;

use super::{DeviceContext, PrinterDriver};
use crate::error::CardError;
use crate::font::{FontSpec, TextMetrics};
use crate::layout::Rect;
use crate::printer::config::Orientation;
use crate::printer::{PrinterIdentity, PrinterScope};

#[link(name = "gdi32")]
unsafe extern "system" {
    fn AbortDoc(hdc: HDC) -> i32;
    fn EndDoc(hdc: HDC) -> i32;
    fn EndPage(hdc: HDC) -> i32;
    fn StartDocW(hdc: HDC, lpdi: *const DOCINFOW) -> i32;
    fn StartPage(hdc: HDC) -> i32;
}

const DMORIENT_PORTRAIT: i16 = 1;
const DMORIENT_LANDSCAPE: i16 = 2;
const FW_NORMAL: i32 = 400;
const FW_BOLD: i32 = 700;

/// Spooler-backed driver.
pub struct GdiDriver {
    orientation: Orientation,
}

impl GdiDriver {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation }
    }
}

impl PrinterDriver for GdiDriver {
    fn name(&self) -> &'static str {
        "gdi"
    }

    #[instrument(skip(self))]
    fn enumerate(&self, scope: &PrinterScope) -> Result<Vec<String>, CardError> {
        let (flags, server) = match scope {
            PrinterScope::Local { .. } => (PRINTER_ENUM_LOCAL, None),
            PrinterScope::Server { server, .. } => (PRINTER_ENUM_NAME, Some(to_wide(server))),
        };
        let server_ptr = server
            .as_ref()
            .map_or(PCWSTR::null(), |s| PCWSTR::from_raw(s.as_ptr()));

        unsafe {
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;
            let _ = EnumPrintersW(flags, server_ptr, 4, None, &mut needed, &mut returned);
            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                server_ptr,
                4,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|e| CardError::Connection(format!("EnumPrintersW failed: {}", e)))?;

            let ptr = buf.as_ptr() as *const PRINTER_INFO_4W;
            let slice = std::slice::from_raw_parts(ptr, returned as usize);
            Ok(slice
                .iter()
                .filter(|info| !info.pPrinterName.is_null())
                .filter_map(|info| PWSTR(info.pPrinterName.0).to_string().ok())
                .collect())
        }
    }

    #[instrument(skip(self), fields(printer = %printer))]
    fn open(&self, printer: &PrinterIdentity) -> Result<Box<dyn DeviceContext>, CardError> {
        let hdc = create_printer_dc(printer.as_str(), self.orientation)?;
        unsafe {
            SetBkMode(hdc, TRANSPARENT);
        }
        debug!("Printer device context created");
        Ok(Box::new(GdiDevice {
            hdc,
            font: None,
            stock_font: None,
            released: false,
        }))
    }

    fn status(&self, printer: &PrinterIdentity) -> Result<u32, CardError> {
        unsafe {
            let mut name_w = to_wide(printer.as_str());
            let mut handle = PRINTER_HANDLE::default();
            OpenPrinterW(PWSTR(name_w.as_mut_ptr()), &mut handle, None)
                .map_err(|e| CardError::Connection(format!("OpenPrinterW failed: {}", e)))?;
            let _guard = PrinterGuard(handle);

            let mut needed: u32 = 0;
            let _ = GetPrinterW(handle, 6, None, &mut needed);
            if needed == 0 {
                return Err(last_win32_error("GetPrinterW"));
            }
            let mut buf: Vec<u8> = vec![0; needed as usize];
            GetPrinterW(handle, 6, Some(buf.as_mut_slice()), &mut needed)
                .map_err(|e| CardError::Connection(format!("GetPrinterW failed: {}", e)))?;
            let info = *(buf.as_ptr() as *const PRINTER_INFO_6);
            Ok(info.dwStatus)
        }
    }
}

/// Create a printer DC, asking the driver for the requested orientation.
///
/// A driver refusing the orientation change is logged and ignored.
fn create_printer_dc(printer: &str, orientation: Orientation) -> Result<HDC, CardError> {
    unsafe {
        let mut printer_w = to_wide(printer);
        let mut hprinter = PRINTER_HANDLE::default();
        OpenPrinterW(PWSTR(printer_w.as_mut_ptr()), &mut hprinter, None).map_err(|e| {
            CardError::Connection(format!("Could not open printer {}: {}", printer, e))
        })?;
        let _guard = PrinterGuard(hprinter);

        let devmode = match printer_devmode(hprinter, &mut printer_w, orientation) {
            Ok(buf) => Some(buf),
            Err(e) => {
                warn!(printer, error = %e, "Could not set page orientation");
                None
            }
        };

        let hdc = CreateDCW(
            w!("WINSPOOL"),
            PCWSTR::from_raw(printer_w.as_ptr()),
            PCWSTR::null(),
            devmode
                .as_ref()
                .map(|buf| buf.as_ptr() as *const DEVMODEW),
        );
        if hdc.is_invalid() {
            return Err(last_win32_error("CreateDCW"));
        }
        Ok(hdc)
    }
}

/// Fetch the driver's DEVMODE and set the orientation on it.
///
/// Backed by a `u64` buffer so the structure is suitably aligned.
unsafe fn printer_devmode(
    hprinter: PRINTER_HANDLE,
    printer_w: &mut [u16],
    orientation: Orientation,
) -> Result<Vec<u64>, CardError> {
    unsafe {
        let needed =
            DocumentPropertiesW(None, hprinter, PWSTR(printer_w.as_mut_ptr()), None, None, 0);
        if needed <= 0 {
            return Err(last_win32_error("DocumentPropertiesW"));
        }

        let mut buf: Vec<u64> = vec![0; (needed as usize).div_ceil(size_of::<u64>())];
        let devmode = buf.as_mut_ptr() as *mut DEVMODEW;

        // DM_OUT_BUFFER
        let r = DocumentPropertiesW(
            None,
            hprinter,
            PWSTR(printer_w.as_mut_ptr()),
            Some(devmode),
            None,
            2,
        );
        if r != 1 {
            return Err(last_win32_error("DocumentPropertiesW"));
        }

        (*devmode).Anonymous1.Anonymous1.dmOrientation = match orientation {
            Orientation::Portrait => DMORIENT_PORTRAIT,
            Orientation::Landscape => DMORIENT_LANDSCAPE,
        };
        (*devmode).dmFields |= DM_ORIENTATION;

        // DM_IN_BUFFER | DM_OUT_BUFFER
        let r = DocumentPropertiesW(
            None,
            hprinter,
            PWSTR(printer_w.as_mut_ptr()),
            Some(devmode),
            Some(devmode),
            10,
        );
        if r != 1 {
            return Err(last_win32_error("DocumentPropertiesW"));
        }
        Ok(buf)
    }
}

/// An open GDI printer device context.
pub struct GdiDevice {
    hdc: HDC,
    font: Option<(FontSpec, HFONT)>,
    /// Font the DC came with, selected back before ours is deleted
    stock_font: Option<HGDIOBJ>,
    released: bool,
}

// The DC is only touched by the thread that currently owns the device.
unsafe impl Send for GdiDevice {}

impl GdiDevice {
    /// Select a GDI font matching `spec`, reusing the current one if equal.
    fn select_font(&mut self, spec: &FontSpec) -> Result<(), CardError> {
        if let Some((current, _)) = &self.font
            && current == spec
        {
            return Ok(());
        }
        let face = to_wide(&spec.face);
        let weight = if spec.bold { FW_BOLD } else { FW_NORMAL };
        unsafe {
            let font = CreateFontW(
                spec.pixel_height as i32,
                0,
                0,
                0,
                weight,
                0,
                0,
                0,
                DEFAULT_CHARSET,
                OUT_DEFAULT_PRECIS,
                CLIP_DEFAULT_PRECIS,
                DEFAULT_QUALITY,
                DEFAULT_PITCH.0 as u32,
                PCWSTR::from_raw(face.as_ptr()),
            );
            if font.is_invalid() {
                return Err(CardError::Draw(format!("CreateFontW failed for {}", spec.face)));
            }
            let previous = SelectObject(self.hdc, HGDIOBJ(font.0));
            if self.stock_font.is_none() {
                self.stock_font = Some(previous);
            }
            if let Some((_, old)) = self.font.replace((spec.clone(), font)) {
                let _ = DeleteObject(HGDIOBJ(old.0));
            }
        }
        Ok(())
    }

    /// Put the DC's own font back and delete ours.
    fn restore_font(&mut self) {
        let Some((_, font)) = self.font.take() else {
            return;
        };
        unsafe {
            if let Some(stock) = self.stock_font.take() {
                SelectObject(self.hdc, stock);
            }
            if !DeleteObject(HGDIOBJ(font.0)).as_bool() {
                warn!("DeleteObject failed for header font");
            }
        }
    }

    fn check(ok: bool, call: &str) -> Result<(), CardError> {
        if ok {
            Ok(())
        } else {
            Err(CardError::Draw(format!(
                "{} failed (win32 error {})",
                call,
                win32_code()
            )))
        }
    }
}

impl TextMetrics for GdiDevice {
    fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32) {
        let face = to_wide(&font.face);
        let wide: Vec<u16> = text.encode_utf16().collect();
        let weight = if font.bold { FW_BOLD } else { FW_NORMAL };
        let mut size = SIZE::default();
        unsafe {
            let hfont = CreateFontW(
                font.pixel_height as i32,
                0,
                0,
                0,
                weight,
                0,
                0,
                0,
                DEFAULT_CHARSET,
                OUT_DEFAULT_PRECIS,
                CLIP_DEFAULT_PRECIS,
                DEFAULT_QUALITY,
                DEFAULT_PITCH.0 as u32,
                PCWSTR::from_raw(face.as_ptr()),
            );
            let previous = SelectObject(self.hdc, HGDIOBJ(hfont.0));
            let measured = GetTextExtentPoint32W(self.hdc, &wide, &mut size).as_bool();
            SelectObject(self.hdc, previous);
            let _ = DeleteObject(HGDIOBJ(hfont.0));
            if !measured {
                warn!(text, "GetTextExtentPoint32W failed");
                return (0, font.pixel_height);
            }
        }
        (size.cx.max(0) as u32, size.cy.max(0) as u32)
    }
}

impl DeviceContext for GdiDevice {
    fn start_document(&mut self, name: &str) -> Result<(), CardError> {
        let doc_w = to_wide(name);
        let di = DOCINFOW {
            cbSize: size_of::<DOCINFOW>() as i32,
            lpszDocName: PCWSTR::from_raw(doc_w.as_ptr()),
            ..Default::default()
        };
        let id = unsafe { StartDocW(self.hdc, &di) };
        Self::check(id > 0, "StartDocW")
    }

    fn start_page(&mut self) -> Result<(), CardError> {
        Self::check(unsafe { StartPage(self.hdc) } > 0, "StartPage")
    }

    fn draw_image(&mut self, image: &RgbImage, dest: Rect) -> Result<(), CardError> {
        let (w, h) = image.dimensions();
        let bgra: Vec<u8> = image
            .pixels()
            .flat_map(|p| [p[2], p[1], p[0], 0xFF])
            .collect();
        let bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: w as i32,
                biHeight: -(h as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let lines = unsafe {
            StretchDIBits(
                self.hdc,
                dest.x,
                dest.y,
                dest.width as i32,
                dest.height as i32,
                0,
                0,
                w as i32,
                h as i32,
                Some(bgra.as_ptr() as *const _),
                &bmi,
                DIB_RGB_COLORS,
                SRCCOPY,
            )
        };
        Self::check(lines != 0, "StretchDIBits")
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: &FontSpec) -> Result<(), CardError> {
        self.select_font(font)?;
        let wide: Vec<u16> = text.encode_utf16().collect();
        let ok = unsafe { TextOutW(self.hdc, x, y, &wide).as_bool() };
        Self::check(ok, "TextOutW")
    }

    fn end_page(&mut self) -> Result<(), CardError> {
        Self::check(unsafe { EndPage(self.hdc) } > 0, "EndPage")
    }

    fn end_document(&mut self) -> Result<(), CardError> {
        Self::check(unsafe { EndDoc(self.hdc) } > 0, "EndDoc")
    }

    fn abort_document(&mut self) -> Result<(), CardError> {
        Self::check(unsafe { AbortDoc(self.hdc) } > 0, "AbortDoc")
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.restore_font();
        unsafe {
            let _ = DeleteDC(self.hdc);
        }
    }
}

impl Drop for GdiDevice {
    fn drop(&mut self) {
        self.release();
    }
}

struct PrinterGuard(PRINTER_HANDLE);

impl Drop for PrinterGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = ClosePrinter(self.0);
        }
    }
}

fn win32_code() -> u32 {
    unsafe { GetLastError().0 }
}

fn last_win32_error(call: &str) -> CardError {
    CardError::Connection(format!("{} failed (win32 error {})", call, win32_code()))
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain([0]).collect()
}
