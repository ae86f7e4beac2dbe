//! # Cardpress CLI
//!
//! Command-line front end for printing library cards.
//!
//! ## Usage
//!
//! ```bash
//! # Print a wallet card on the first card printer
//! cardpress print --number 12345678901234
//!
//! # Print keychain tags on a named printer, skipping the card prompt
//! cardpress print --number 12345678901234 --mode triple --printer "Card Printer 2" --yes
//!
//! # Save the composed card as PNG
//! cardpress preview --number 12345678901234 --mode triple --out card.png
//!
//! # List printers and check one
//! cardpress printers
//! cardpress status "Card Printer 2"
//! ```

use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use cardpress::{
    AccountNumber, CardComposer, CardError, JobOutcome, LayoutMode, PrintJobController,
    config::AppConfig,
    device::{PrinterDriver, RasterDriver},
    font::TextRenderer,
    job::{AuditLog, Operator, RetryChoice, failure_message},
    logging,
    printer::{LayoutProfile, PrinterDirectory, PrinterIdentity, PrinterStatusMonitor},
    session::Session,
};

/// Cardpress - Library card printer utility
#[derive(Parser, Debug)]
#[command(name = "cardpress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Layout profile (local, network, full-card)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Printer backend
    #[arg(long, global = true, value_enum, default_value_t = DriverKind::Raster)]
    driver: DriverKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// Virtual printer writing PNG files
    Raster,
    /// Windows printers through GDI
    Gdi,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a card
    Print {
        /// 14-digit library account number
        #[arg(long)]
        number: String,

        /// Card layout (single, triple)
        #[arg(long, default_value = "single")]
        mode: LayoutMode,

        /// Printer display name (defaults to the first listed printer)
        #[arg(long)]
        printer: Option<String>,

        /// Assume a card is loaded
        #[arg(long)]
        yes: bool,
    },

    /// Save the composed card as PNG instead of printing
    Preview {
        /// 14-digit library account number
        #[arg(long)]
        number: String,

        /// Card layout (single, triple)
        #[arg(long, default_value = "single")]
        mode: LayoutMode,

        /// Output file
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// List available printers
    Printers,

    /// Show a printer's health
    Status {
        /// Printer display name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CardError> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let profile = match &cli.profile {
        Some(name) => LayoutProfile::parse(name).map_err(CardError::Config)?,
        None => config.layout_profile()?,
    };
    let text = Arc::new(TextRenderer::load(&config.fonts));

    match cli.command {
        Commands::Preview { number, mode, out } => {
            let account = AccountNumber::parse(&number)?;
            let image = cardpress::barcode::render(&account, &Default::default(), &text)?;
            let card = CardComposer::new(profile).compose(Some(image.as_ref()), mode, &text)?;
            card.raster.save(&out).map_err(|e| {
                CardError::Render(format!("Failed to save {}: {}", out.display(), e))
            })?;
            println!("Saved {} ({}) to {}", account, mode, out.display());
        }

        Commands::Printers => {
            let driver = make_driver(cli.driver, &config, &profile, &text)?;
            let directory = PrinterDirectory::build(driver.as_ref(), &config.printers)?;
            if directory.is_empty() {
                println!("No printers found.");
            }
            for (display, identity) in directory.iter() {
                println!("{}\t{}", display, identity);
            }
        }

        Commands::Status { name } => {
            let driver = make_driver(cli.driver, &config, &profile, &text)?;
            let directory = PrinterDirectory::build(driver.as_ref(), &config.printers)?;
            let printer = directory.resolve(&name);
            let state = PrinterStatusMonitor::new(driver).query(&printer);
            println!("{}: {}", printer, state);
        }

        Commands::Print {
            number,
            mode,
            printer,
            yes,
        } => {
            let driver = make_driver(cli.driver, &config, &profile, &text)?;
            let directory = PrinterDirectory::build(driver.as_ref(), &config.printers)?;

            let mut session = Session::new(Arc::new(directory), text.clone());
            session.generate(&number)?;
            session.select_mode(mode);
            if let Some(name) = printer {
                session.select_printer(&name);
            }
            let spec = session.snapshot()?;

            let controller = PrintJobController::new(
                driver,
                CardComposer::new(profile),
                Arc::new(AuditLog::new(&config.audit_log)),
                config.job_config(),
            );
            let operator = ConsoleOperator { assume_loaded: yes };

            match controller.run(spec, &operator).await? {
                JobOutcome::Succeeded { .. } | JobOutcome::SuppressedFailure { .. } => {}
                JobOutcome::Declined => println!("Print cancelled."),
                JobOutcome::Failed { error, .. } => return Err(error),
                JobOutcome::TimedOut { .. } => {
                    return Err(CardError::Timeout(format!(
                        "no response within {}s",
                        config.timeout_secs
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Build the selected printer backend.
fn make_driver(
    kind: DriverKind,
    config: &AppConfig,
    profile: &LayoutProfile,
    text: &Arc<TextRenderer>,
) -> Result<Arc<dyn PrinterDriver>, CardError> {
    match kind {
        DriverKind::Raster => {
            let (width, height) = profile.card_size();
            Ok(Arc::new(
                RasterDriver::new(&config.output_dir)
                    .with_page_size(width, height)
                    .with_text(text.clone()),
            ))
        }
        #[cfg(windows)]
        DriverKind::Gdi => Ok(Arc::new(cardpress::device::GdiDriver::new(
            profile.orientation,
        ))),
        #[cfg(not(windows))]
        DriverKind::Gdi => Err(CardError::Config(
            "The gdi driver is only available on Windows".to_string(),
        )),
    }
}

/// Operator prompts on the terminal.
struct ConsoleOperator {
    assume_loaded: bool,
}

/// Ask a question on stdout and read one answer line.
async fn ask(question: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        print!("{} ", question);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line).ok()?;
        Some(line.trim().to_lowercase())
    })
    .await
    .ok()
    .flatten()
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm_card_loaded(&self, printer: &PrinterIdentity, mode: LayoutMode) -> bool {
        if self.assume_loaded {
            return true;
        }
        let answer = ask(format!(
            "Printing {} on {}. Is there a card in the printer? [y/N]",
            mode, printer
        ))
        .await;
        matches!(answer.as_deref(), Some("y") | Some("yes"))
    }

    async fn offer_retry(&self, error: &CardError, attempt: u32) -> RetryChoice {
        eprintln!("{}", failure_message(error));
        let answer = ask(format!("Attempt {} failed. [r]etry or [c]ancel?", attempt)).await;
        match answer.as_deref() {
            Some("r") | Some("retry") => RetryChoice::Retry,
            _ => RetryChoice::Cancel,
        }
    }

    async fn notify_success(&self, message: &str) {
        println!("{}", message);
    }

    async fn notify_error(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn show_progress(&self, visible: bool) {
        if visible {
            eprintln!("Printing...");
        }
    }
}
