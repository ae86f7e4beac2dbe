//! # Print Jobs
//!
//! Runs one print job at a time: operator confirmation, composition and
//! dispatch on a blocking worker, a bounded wait, retry prompts and the
//! audit log.
//!
//! ## State Machine
//!
//! ```text
//! Idle ─► Confirming ─► Rendering ─► Dispatching ─┬─► Succeeded
//!   ▲          │ no          ▲                    ├─► Failed ──► retry ─┐
//!   └──────────┘             └────────────────────┼────────────────────┘
//!                                                 └─► TimedOut
//! ```
//!
//! The worker is never cancelled. When the timeout fires first the worker
//! keeps running; a [`ResolutionToken`] decides whose outcome is reported,
//! and a late worker result is discarded. Until that orphaned worker exits
//! the controller keeps refusing new jobs with [`CardError::Busy`], even
//! though its state is back to `Idle`.
//!
//! ## Example
//!
//! ```ignore
//! let controller = PrintJobController::new(driver, composer, audit, JobConfig::default());
//! let outcome = controller.run(session.snapshot(), &operator).await?;
//! ```

pub mod audit;
pub mod operator;
pub mod token;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::barcode::BarcodeImage;
use crate::device::{PrinterConnection, PrinterDriver};
use crate::error::CardError;
use crate::layout::{CardArtwork, CardComposer, LayoutMode};
use crate::printer::PrinterIdentity;

pub use audit::{AuditLog, AuditLogEntry};
pub use operator::{Operator, RetryChoice};
pub use token::ResolutionToken;

use operator::ProgressGuard;

/// Default bound on one dispatch attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default pause after a dispatch before reporting.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1500);

/// Shown when a dispatch outlives the timeout.
pub const TIMEOUT_MESSAGE: &str = "Printer is not responding. Please check the printer and try again.";

/// Lifecycle of the single job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Confirming,
    Rendering,
    Dispatching,
    Succeeded,
    Failed,
    TimedOut,
}

/// How connection failures are reported to the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReporting {
    /// Every failure is reported as a failure
    #[default]
    Honest,
    /// A printer that cannot be opened is reported as a success
    Optimistic,
}

/// Timing and reporting policy of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    pub timeout: Duration,
    pub settle: Duration,
    pub reporting: FailureReporting,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            settle: DEFAULT_SETTLE,
            reporting: FailureReporting::Honest,
        }
    }
}

/// Everything a worker needs, captured when the job starts.
///
/// The image is shared, not borrowed: a barcode generated while the job
/// runs does not affect it.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub printer: PrinterIdentity,
    pub mode: LayoutMode,
    pub image: Option<Arc<BarcodeImage>>,
}

/// How a job ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// The operator said no card was loaded
    Declined,
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: CardError },
    TimedOut { attempts: u32 },
    /// A connection failure reported as success under optimistic reporting
    SuppressedFailure { attempts: u32, error: CardError },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Operator-facing text for a failed attempt.
pub fn failure_message(error: &CardError) -> String {
    match error {
        CardError::NoImage => "Generate the barcode first.".to_string(),
        CardError::Timeout(_) => TIMEOUT_MESSAGE.to_string(),
        other => format!("Printing failed:\n{}", other),
    }
}

/// Operator-facing text for a completed print.
pub fn success_message(printer: &PrinterIdentity, mode: LayoutMode) -> String {
    format!("Printed to {} ({}).", printer, mode.label())
}

/// Result of one attempt as seen by the controller.
enum Attempt {
    Finished(Result<(), CardError>),
    TimedOut,
}

/// Drives print jobs through a [`PrinterDriver`].
pub struct PrintJobController {
    driver: Arc<dyn PrinterDriver>,
    composer: CardComposer,
    audit: Arc<AuditLog>,
    config: JobConfig,
    state: watch::Sender<JobState>,
    /// Set while a worker thread is alive, including after a timeout
    worker_alive: Arc<AtomicBool>,
}

impl PrintJobController {
    pub fn new(
        driver: Arc<dyn PrinterDriver>,
        composer: CardComposer,
        audit: Arc<AuditLog>,
        config: JobConfig,
    ) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            driver,
            composer,
            audit,
            config,
            state,
            worker_alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Whether a worker thread is still running, possibly orphaned by a timeout.
    pub fn worker_running(&self) -> bool {
        self.worker_alive.load(Ordering::SeqCst)
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Run one job to completion, including any retries.
    ///
    /// Fails with [`CardError::Busy`] if a job is already in progress or a
    /// timed-out worker is still running; every other failure is reported
    /// through `operator` and the returned outcome.
    pub async fn run(
        &self,
        spec: JobSpec,
        operator: &dyn Operator,
    ) -> Result<JobOutcome, CardError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == JobState::Idle && !self.worker_alive.load(Ordering::SeqCst) {
                *state = JobState::Confirming;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = ?self.state(), "Job rejected, controller busy");
            return Err(CardError::Busy);
        }
        let _slot = SlotGuard(&self.state);

        let span = info_span!(
            "print_job",
            job = %Uuid::new_v4(),
            printer = %spec.printer,
            mode = %spec.mode
        );
        Ok(self.drive(spec, operator).instrument(span).await)
    }

    async fn drive(&self, spec: JobSpec, operator: &dyn Operator) -> JobOutcome {
        if !operator.confirm_card_loaded(&spec.printer, spec.mode).await {
            info!("Print declined: no card loaded");
            return JobOutcome::Declined;
        }

        let mut attempts = 1;
        loop {
            let result = {
                let _progress = ProgressGuard::show(operator);
                self.attempt(&spec, attempts)
                    .instrument(info_span!("attempt", n = attempts))
                    .await
            };

            let error = match result {
                Attempt::Finished(Ok(())) => {
                    self.transition(JobState::Succeeded);
                    operator
                        .notify_success(&success_message(&spec.printer, spec.mode))
                        .await;
                    return JobOutcome::Succeeded { attempts };
                }
                Attempt::TimedOut => {
                    self.transition(JobState::TimedOut);
                    operator.notify_error(TIMEOUT_MESSAGE).await;
                    return JobOutcome::TimedOut { attempts };
                }
                Attempt::Finished(Err(e)) => e,
            };

            self.transition(JobState::Failed);

            if self.config.reporting == FailureReporting::Optimistic
                && matches!(error, CardError::Connection(_))
            {
                warn!(error = %error, "Connection failure reported as success");
                operator
                    .notify_success(&success_message(&spec.printer, spec.mode))
                    .await;
                return JobOutcome::SuppressedFailure { attempts, error };
            }

            if !error.is_retryable() {
                warn!(error = %error, "Print failed");
                operator.notify_error(&failure_message(&error)).await;
                return JobOutcome::Failed { attempts, error };
            }

            warn!(error = %error, attempt = attempts, "Print failed, offering retry");
            match operator.offer_retry(&error, attempts).await {
                RetryChoice::Retry => {
                    attempts += 1;
                    // The card was already confirmed for this job
                    self.transition(JobState::Confirming);
                }
                RetryChoice::Cancel => {
                    info!("Retry cancelled");
                    return JobOutcome::Failed { attempts, error };
                }
            }
        }
    }

    async fn attempt(&self, spec: &JobSpec, attempt: u32) -> Attempt {
        self.transition(JobState::Rendering);

        let token = ResolutionToken::new();
        let (done_tx, mut done_rx) = oneshot::channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            driver: self.driver.clone(),
            composer: self.composer.clone(),
            audit: self.audit.clone(),
            settle: self.config.settle,
            spec: spec.clone(),
            token: token.clone(),
            alive: WorkerAlive::hold(&self.worker_alive),
        };
        let span = Span::current();
        // Detached: a timed-out worker runs to completion on its own
        tokio::task::spawn_blocking(move || span.in_scope(|| worker.run(event_tx, done_tx)));
        debug!(attempt, "Worker started");

        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                Some(state) = event_rx.recv() => self.transition(state),
                result = &mut done_rx => return Attempt::Finished(worker_result(result)),
                _ = &mut deadline => {
                    if token.try_resolve() {
                        warn!(timeout_ms = self.config.timeout.as_millis() as u64, "Printer did not finish in time");
                        return Attempt::TimedOut;
                    }
                    // The worker claimed the token first and is about to report
                    return Attempt::Finished(worker_result((&mut done_rx).await));
                }
            }
        }
    }

    fn transition(&self, state: JobState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(from = ?previous, to = ?state, "Job state");
        }
    }
}

fn worker_result(
    result: Result<Result<(), CardError>, oneshot::error::RecvError>,
) -> Result<(), CardError> {
    result.unwrap_or_else(|_| Err(CardError::Draw("Print worker stopped unexpectedly".to_string())))
}

/// Returns the controller to `Idle` however the job ends.
struct SlotGuard<'a>(&'a watch::Sender<JobState>);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(JobState::Idle);
    }
}

/// Marks a worker as running until released or dropped.
struct WorkerAlive(Option<Arc<AtomicBool>>);

impl WorkerAlive {
    fn hold(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Some(flag.clone()))
    }

    fn release(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for WorkerAlive {
    fn drop(&mut self) {
        self.release();
    }
}

/// The blocking half of one attempt.
struct Worker {
    driver: Arc<dyn PrinterDriver>,
    composer: CardComposer,
    audit: Arc<AuditLog>,
    settle: Duration,
    spec: JobSpec,
    token: ResolutionToken,
    alive: WorkerAlive,
}

impl Worker {
    fn run(
        mut self,
        events: mpsc::UnboundedSender<JobState>,
        done: oneshot::Sender<Result<(), CardError>>,
    ) {
        let result = self.dispatch(&events);

        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }

        if result.is_ok() {
            self.audit.record(&AuditLogEntry::now(
                self.spec.printer.clone(),
                self.spec.mode,
            ));
        }

        // Cleared before reporting so the next job sees the printer free
        let resolved = self.token.try_resolve();
        self.alive.release();
        if resolved {
            let _ = done.send(result);
        } else {
            info!(ok = result.is_ok(), "Worker finished after timeout, outcome discarded");
        }
    }

    fn dispatch(&self, events: &mpsc::UnboundedSender<JobState>) -> Result<(), CardError> {
        let artwork = self
            .composer
            .prepare(self.spec.image.as_deref(), self.spec.mode)?;

        let _ = events.send(JobState::Dispatching);
        let mut conn = PrinterConnection::open(self.driver.as_ref(), &self.spec.printer)?;
        let result = draw_card(&mut conn, &self.composer, &artwork);
        if let Err(e) = &result {
            warn!(error = %e, "Draw failed, aborting document");
            conn.abort_if_open();
        }
        conn.close();
        result
    }
}

/// Lay out and draw one card on an open connection.
fn draw_card(
    conn: &mut PrinterConnection,
    composer: &CardComposer,
    artwork: &CardArtwork,
) -> Result<(), CardError> {
    let layout = composer.layout(artwork.mode, &*conn);

    conn.start_document(artwork.mode.document_name())?;
    conn.start_page()?;
    for (i, rect) in layout.barcodes.iter().enumerate() {
        if let Some(header) = layout.headers.get(i) {
            conn.draw_text(&header.text, header.x, header.y, &header.font)?;
        }
        conn.draw_image(&artwork.barcode, *rect)?;
    }
    conn.end_page()?;
    conn.end_document()?;

    debug!(
        barcodes = layout.barcodes.len(),
        headers = layout.headers.len(),
        "Card drawn"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountNumber;
    use crate::device::DeviceContext;
    use crate::font::{FontSpec, TextMetrics};
    use crate::layout::Rect;
    use crate::printer::PrinterScope;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Driver whose devices record calls, optionally failing or stalling.
    struct ScriptedDriver {
        calls: CallLog,
        open_failures: AtomicU32,
        opens: AtomicU32,
        fail_on: Option<&'static str>,
        stall: Duration,
    }

    impl ScriptedDriver {
        fn new() -> Self {
            Self {
                calls: Arc::default(),
                open_failures: AtomicU32::new(0),
                opens: AtomicU32::new(0),
                fail_on: None,
                stall: Duration::ZERO,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|c| *c == name).count()
        }
    }

    impl PrinterDriver for ScriptedDriver {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn enumerate(&self, _scope: &PrinterScope) -> Result<Vec<String>, CardError> {
            Ok(vec!["Card Printer".to_string()])
        }

        fn open(&self, printer: &PrinterIdentity) -> Result<Box<dyn DeviceContext>, CardError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let remaining = self.open_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.open_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CardError::Connection(format!("{} is offline", printer)));
            }
            Ok(Box::new(ScriptedDevice {
                calls: self.calls.clone(),
                fail_on: self.fail_on,
                stall: self.stall,
            }))
        }

        fn status(&self, _printer: &PrinterIdentity) -> Result<u32, CardError> {
            Ok(0)
        }
    }

    struct ScriptedDevice {
        calls: CallLog,
        fail_on: Option<&'static str>,
        stall: Duration,
    }

    impl ScriptedDevice {
        fn step(&self, name: &'static str) -> Result<(), CardError> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.fail_on == Some(name) {
                return Err(CardError::Draw(format!("{} failed", name)));
            }
            Ok(())
        }
    }

    impl TextMetrics for ScriptedDevice {
        fn measure(&self, text: &str, font: &FontSpec) -> (u32, u32) {
            (text.len() as u32 * 14, font.pixel_height)
        }
    }

    impl DeviceContext for ScriptedDevice {
        fn start_document(&mut self, _name: &str) -> Result<(), CardError> {
            self.step("start_document")
        }
        fn start_page(&mut self) -> Result<(), CardError> {
            std::thread::sleep(self.stall);
            self.step("start_page")
        }
        fn draw_image(&mut self, _image: &RgbImage, _dest: Rect) -> Result<(), CardError> {
            self.step("draw_image")
        }
        fn draw_text(&mut self, _t: &str, _x: i32, _y: i32, _f: &FontSpec) -> Result<(), CardError> {
            self.step("draw_text")
        }
        fn end_page(&mut self) -> Result<(), CardError> {
            self.step("end_page")
        }
        fn end_document(&mut self) -> Result<(), CardError> {
            self.step("end_document")
        }
        fn abort_document(&mut self) -> Result<(), CardError> {
            self.step("abort_document")
        }
        fn release(&mut self) {
            self.calls.lock().unwrap().push("release".to_string());
        }
    }

    /// Operator with canned answers that records what it was shown.
    struct ScriptedOperator {
        confirm: bool,
        retries: Mutex<VecDeque<RetryChoice>>,
        events: Mutex<Vec<String>>,
    }

    impl ScriptedOperator {
        fn new(confirm: bool, retries: &[RetryChoice]) -> Self {
            Self {
                confirm,
                retries: Mutex::new(retries.iter().copied().collect()),
                events: Mutex::new(Vec::new()),
            }
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Operator for ScriptedOperator {
        async fn confirm_card_loaded(&self, _printer: &PrinterIdentity, _mode: LayoutMode) -> bool {
            self.push("confirm".to_string());
            self.confirm
        }

        async fn offer_retry(&self, _error: &CardError, attempt: u32) -> RetryChoice {
            self.push(format!("retry? {}", attempt));
            self.retries
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RetryChoice::Cancel)
        }

        async fn notify_success(&self, message: &str) {
            self.push(format!("success: {}", message));
        }

        async fn notify_error(&self, message: &str) {
            self.push(format!("error: {}", message));
        }

        fn show_progress(&self, visible: bool) {
            self.push(format!("progress {}", if visible { "on" } else { "off" }));
        }
    }

    fn image() -> Arc<BarcodeImage> {
        let account = AccountNumber::parse("12345678901234").unwrap();
        Arc::new(BarcodeImage::from_raster(
            account,
            RgbImage::from_pixel(400, 260, Rgb([0, 0, 0])),
        ))
    }

    fn spec(mode: LayoutMode) -> JobSpec {
        JobSpec {
            printer: PrinterIdentity::new("Card Printer"),
            mode,
            image: Some(image()),
        }
    }

    fn controller(
        driver: Arc<ScriptedDriver>,
        dir: &tempfile::TempDir,
        config: JobConfig,
    ) -> PrintJobController {
        PrintJobController::new(
            driver,
            CardComposer::default(),
            Arc::new(AuditLog::new(dir.path().join("print_log.txt"))),
            config,
        )
    }

    fn fast() -> JobConfig {
        JobConfig {
            timeout: Duration::from_secs(5),
            settle: Duration::ZERO,
            reporting: FailureReporting::Honest,
        }
    }

    fn audit_lines(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("print_log.txt"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_declined_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(false, &[]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Declined));
        assert_eq!(driver.opens.load(Ordering::SeqCst), 0);
        assert!(audit_lines(&dir).is_empty());
        assert_eq!(operator.events(), vec!["confirm"]);
        assert_eq!(controller.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_triple_job_draws_headers_and_barcodes() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(true, &[]);

        let outcome = controller.run(spec(LayoutMode::Triple), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Succeeded { attempts: 1 }));
        assert_eq!(driver.count("draw_text"), 3);
        assert_eq!(driver.count("draw_image"), 3);
        assert_eq!(driver.calls().last().map(String::as_str), Some("release"));
        assert_eq!(
            operator.events(),
            vec![
                "confirm",
                "progress on",
                "progress off",
                "success: Printed to Card Printer (Triple Keychain)."
            ]
        );
        let lines = audit_lines(&dir);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Printed to Card Printer (Triple Keychain)"));
    }

    #[tokio::test]
    async fn test_connection_failure_retry_skips_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        driver.open_failures.store(1, Ordering::SeqCst);
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(true, &[RetryChoice::Retry]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Succeeded { attempts: 2 }));
        assert_eq!(driver.opens.load(Ordering::SeqCst), 2);
        let events = operator.events();
        assert_eq!(events.iter().filter(|e| *e == "confirm").count(), 1);
        assert!(events.contains(&"retry? 1".to_string()));
        assert_eq!(audit_lines(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_retry_fails_without_log() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        driver.open_failures.store(5, Ordering::SeqCst);
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(true, &[RetryChoice::Cancel]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                attempts: 1,
                error: CardError::Connection(_)
            }
        ));
        assert!(audit_lines(&dir).is_empty());
        assert_eq!(controller.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_draw_failure_aborts_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripted = ScriptedDriver::new();
        scripted.fail_on = Some("draw_image");
        let driver = Arc::new(scripted);
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(true, &[]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        assert_eq!(
            driver.calls(),
            vec![
                "start_document",
                "start_page",
                "draw_image",
                "abort_document",
                "release"
            ]
        );
        assert!(audit_lines(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        let controller = controller(driver.clone(), &dir, fast());
        let operator = ScriptedOperator::new(true, &[RetryChoice::Retry]);

        let mut job = spec(LayoutMode::Single);
        job.image = None;
        let outcome = controller.run(job, &operator).await.unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                error: CardError::NoImage,
                ..
            }
        ));
        assert_eq!(driver.opens.load(Ordering::SeqCst), 0);
        assert_eq!(
            operator.events().last().map(String::as_str),
            Some("error: Generate the barcode first.")
        );
    }

    #[tokio::test]
    async fn test_optimistic_reporting_hides_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        driver.open_failures.store(1, Ordering::SeqCst);
        let config = JobConfig {
            reporting: FailureReporting::Optimistic,
            ..fast()
        };
        let controller = controller(driver, &dir, config);
        let operator = ScriptedOperator::new(true, &[]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::SuppressedFailure { .. }));
        assert!(!outcome.is_success());
        assert!(operator.events().last().unwrap().starts_with("success:"));
        assert!(audit_lines(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_timeout_discards_late_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripted = ScriptedDriver::new();
        scripted.stall = Duration::from_millis(300);
        let driver = Arc::new(scripted);
        let config = JobConfig {
            timeout: Duration::from_millis(50),
            ..fast()
        };
        let controller = controller(driver.clone(), &dir, config);
        let operator = ScriptedOperator::new(true, &[]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();
        assert!(matches!(outcome, JobOutcome::TimedOut { attempts: 1 }));
        let timeout_notice = format!("error: {}", TIMEOUT_MESSAGE);
        assert_eq!(
            operator.events(),
            vec![
                "confirm",
                "progress on",
                "progress off",
                timeout_notice.as_str()
            ]
        );

        // Let the orphaned worker finish
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(driver.count("end_document"), 1);
        assert_eq!(audit_lines(&dir).len(), 1);
        assert!(!operator.events().iter().any(|e| e.starts_with("success")));
    }

    #[tokio::test]
    async fn test_second_job_while_busy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut scripted = ScriptedDriver::new();
        scripted.stall = Duration::from_millis(200);
        let driver = Arc::new(scripted);
        let controller = Arc::new(controller(driver, &dir, fast()));

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let operator = ScriptedOperator::new(true, &[]);
                controller.run(spec(LayoutMode::Single), &operator).await
            })
        };

        let mut states = controller.subscribe();
        states
            .wait_for(|s| *s == JobState::Dispatching)
            .await
            .unwrap();

        let operator = ScriptedOperator::new(true, &[]);
        let second = controller.run(spec(LayoutMode::Single), &operator).await;
        assert!(matches!(second, Err(CardError::Busy)));
        assert!(operator.events().is_empty());

        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.is_success());
        assert_eq!(controller.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_orphaned_worker_keeps_controller_busy() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        let config = JobConfig {
            timeout: Duration::from_millis(20),
            settle: Duration::from_millis(400),
            ..fast()
        };
        let controller = controller(driver.clone(), &dir, config);

        let operator = ScriptedOperator::new(true, &[]);
        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();
        assert!(matches!(outcome, JobOutcome::TimedOut { attempts: 1 }));
        assert_eq!(controller.state(), JobState::Idle);
        assert!(controller.worker_running());

        let operator = ScriptedOperator::new(true, &[]);
        let second = controller.run(spec(LayoutMode::Single), &operator).await;
        assert!(matches!(second, Err(CardError::Busy)));
        assert!(operator.events().is_empty());
        assert_eq!(driver.opens.load(Ordering::SeqCst), 1);

        // Wait out the settle delay of the first worker
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!controller.worker_running());
        assert_eq!(audit_lines(&dir).len(), 1);

        let fast_controller = PrintJobController {
            config: fast(),
            ..controller
        };
        let outcome = fast_controller
            .run(spec(LayoutMode::Single), &operator)
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(driver.opens.load(Ordering::SeqCst), 2);
        assert_eq!(audit_lines(&dir).len(), 2);
    }

    #[tokio::test]
    async fn test_audit_failure_still_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver::new());
        // A directory cannot be opened for appending
        let controller = PrintJobController::new(
            driver.clone(),
            CardComposer::default(),
            Arc::new(AuditLog::new(dir.path())),
            fast(),
        );
        let operator = ScriptedOperator::new(true, &[]);

        let outcome = controller.run(spec(LayoutMode::Single), &operator).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Succeeded { attempts: 1 }));
        assert_eq!(
            operator.events().last().map(String::as_str),
            Some("success: Printed to Card Printer (Single Card).")
        );
        assert_eq!(driver.count("end_document"), 1);
        assert_eq!(controller.state(), JobState::Idle);
    }
}
