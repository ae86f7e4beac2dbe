//! Operator session state.
//!
//! Holds what the operator has entered and chosen so far. Print jobs take
//! an immutable [`JobSpec`] snapshot, so regenerating a barcode while a job
//! is running never changes what that job prints.

use std::sync::Arc;
use tracing::{debug, info};

use crate::account::AccountNumber;
use crate::barcode::{self, BarcodeImage, BarcodeStyle};
use crate::error::CardError;
use crate::font::TextRenderer;
use crate::job::JobSpec;
use crate::layout::{CardComposer, CardSurface, LayoutMode};
use crate::printer::{PrinterDirectory, PrinterIdentity};

pub struct Session {
    directory: Arc<PrinterDirectory>,
    text: Arc<TextRenderer>,
    style: BarcodeStyle,
    account: Option<AccountNumber>,
    image: Option<Arc<BarcodeImage>>,
    mode: LayoutMode,
    printer: Option<PrinterIdentity>,
}

impl Session {
    /// A new session with the first directory entry preselected.
    pub fn new(directory: Arc<PrinterDirectory>, text: Arc<TextRenderer>) -> Self {
        let printer = directory.iter().next().map(|(_, p)| p.clone());
        Self {
            directory,
            text,
            style: BarcodeStyle::default(),
            account: None,
            image: None,
            mode: LayoutMode::default(),
            printer,
        }
    }

    pub fn with_style(mut self, style: BarcodeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn directory(&self) -> &PrinterDirectory {
        &self.directory
    }

    pub fn account(&self) -> Option<&AccountNumber> {
        self.account.as_ref()
    }

    pub fn image(&self) -> Option<&Arc<BarcodeImage>> {
        self.image.as_ref()
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn printer(&self) -> Option<&PrinterIdentity> {
        self.printer.as_ref()
    }

    /// Validate `input` and render its barcode.
    ///
    /// Invalid input leaves the current barcode in place.
    pub fn generate(&mut self, input: &str) -> Result<Arc<BarcodeImage>, CardError> {
        let account = AccountNumber::parse(input)?;
        let image = barcode::render(&account, &self.style, &self.text)?;
        info!(account = %account, width = image.width(), height = image.height(), "Barcode generated");
        self.account = Some(account);
        self.image = Some(image.clone());
        Ok(image)
    }

    /// Switch layout. The current barcode stays valid.
    pub fn select_mode(&mut self, mode: LayoutMode) {
        debug!(mode = %mode, "Mode selected");
        self.mode = mode;
    }

    /// Choose a printer by display name.
    ///
    /// Names missing from the directory are used as printer identities as-is.
    pub fn select_printer(&mut self, display_name: &str) -> &PrinterIdentity {
        let identity = self.directory.resolve(display_name);
        debug!(display = display_name, printer = %identity, "Printer selected");
        self.printer.insert(identity)
    }

    /// Forget the current account and barcode.
    pub fn clear(&mut self) {
        self.account = None;
        self.image = None;
    }

    /// Capture everything a print job needs.
    ///
    /// A missing barcode is not an error here; the job reports it.
    pub fn snapshot(&self) -> Result<JobSpec, CardError> {
        let printer = self
            .printer
            .clone()
            .ok_or_else(|| CardError::Connection("No printer selected".to_string()))?;
        Ok(JobSpec {
            printer,
            mode: self.mode,
            image: self.image.clone(),
        })
    }

    /// Compose the current barcode for on-screen or file preview.
    pub fn preview(&self, composer: &CardComposer) -> Result<CardSurface, CardError> {
        composer.compose(self.image.as_deref(), self.mode, &self.text)
    }
}
