//! # Cardpress - Library Card Printing
//!
//! Cardpress prints library cards with a Codabar account barcode on
//! desktop card printers. It provides:
//!
//! - **Barcode rendering**: Codabar symbol plus human-readable caption
//! - **Card composition**: single wallet card or three keychain tags
//! - **Printer devices**: Windows GDI printers and a PNG-writing virtual printer
//! - **Print jobs**: confirmation, bounded dispatch, retry prompts, audit log
//! - **Printer health**: status bits mapped to a red/amber/green indicator
//!
//! ## Quick Start
//!
//! ```no_run
//! use cardpress::{
//!     device::RasterDriver,
//!     font::TextRenderer,
//!     layout::{CardComposer, LayoutMode},
//!     printer::{LayoutProfile, PrinterDirectory, PrinterScope},
//!     session::Session,
//! };
//! use std::sync::Arc;
//!
//! let driver = RasterDriver::new("cards");
//! let directory = PrinterDirectory::build(&driver, &PrinterScope::default())?;
//! let mut session = Session::new(Arc::new(directory), Arc::new(TextRenderer::bitmap()));
//!
//! session.generate("12345678901234")?;
//! session.select_mode(LayoutMode::Triple);
//!
//! let card = session.preview(&CardComposer::new(LayoutProfile::network()))?;
//! card.raster.save("card.png").ok();
//! # Ok::<(), cardpress::CardError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`account`] | Account number validation |
//! | [`barcode`] | Codabar rendering |
//! | [`layout`] | Card geometry and composition |
//! | [`device`] | Printer drivers and scoped connections |
//! | [`printer`] | Printer identities, directory, profiles, health |
//! | [`job`] | Print job controller and audit log |
//! | [`session`] | Operator session state |
//! | [`config`] | JSON configuration |
//! | [`error`] | Error types |

pub mod account;
pub mod barcode;
pub mod config;
pub mod device;
pub mod error;
pub mod font;
pub mod job;
pub mod layout;
pub mod logging;
pub mod printer;
pub mod session;

// Re-exports for convenience
pub use account::AccountNumber;
pub use error::{CardError, CardResult};
pub use job::{JobOutcome, PrintJobController};
pub use layout::{CardComposer, LayoutMode};
pub use printer::LayoutProfile;
