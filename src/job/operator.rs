//! The operator-facing side of a print job.

use async_trait::async_trait;

use crate::error::CardError;
use crate::layout::LayoutMode;
use crate::printer::PrinterIdentity;

/// Answer to a failed print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryChoice {
    Retry,
    Cancel,
}

/// Prompts and notifications shown to whoever runs the printer.
///
/// Implemented by the console front end and by scripted operators in tests.
#[async_trait]
pub trait Operator: Send + Sync {
    /// "Is there a card in the printer?"
    async fn confirm_card_loaded(&self, printer: &PrinterIdentity, mode: LayoutMode) -> bool;

    /// Offer a retry after `attempt` failed with `error`.
    async fn offer_retry(&self, error: &CardError, attempt: u32) -> RetryChoice;

    async fn notify_success(&self, message: &str);

    async fn notify_error(&self, message: &str);

    /// Start or stop the progress indicator.
    fn show_progress(&self, visible: bool);
}

/// Hides the progress indicator when dropped.
pub(crate) struct ProgressGuard<'a> {
    operator: &'a dyn Operator,
}

impl<'a> ProgressGuard<'a> {
    pub(crate) fn show(operator: &'a dyn Operator) -> Self {
        operator.show_progress(true);
        Self { operator }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.operator.show_progress(false);
    }
}
