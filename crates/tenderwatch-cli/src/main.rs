use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use tenderwatch::monitor::{self, Monitor, MonitorConfig};
use tenderwatch::store;
use tenderwatch::types::Tender;

#[derive(Parser)]
#[command(name = "tenderwatch")]
#[command(about = "Monitors PPRA active tenders and alerts on new ones", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the listing, alert on tenders not yet in the history store, persist the rest
    Monitor {
        #[arg(long, help = "City name to filter tenders (scrapes all when omitted)")]
        city: Option<String>,

        #[arg(
            long = "chat-to",
            env = "TWILIO_WHATSAPP_TO",
            help = "WhatsApp recipient for alerts"
        )]
        chat_to: Option<String>,

        #[arg(
            long = "email-to",
            env = "GMAIL_SMTP_TO",
            help = "Email recipient for alerts"
        )]
        email_to: Option<String>,

        #[arg(
            long,
            default_value = monitor::DEFAULT_STORE_PATH,
            help = "Path of the tender history file"
        )]
        store: PathBuf,

        #[arg(
            long = "timeout-secs",
            default_value_t = 30,
            help = "Bound for page waits, in seconds"
        )]
        timeout_secs: u64,

        #[arg(long = "no-headless", help = "Run the browser in visible mode")]
        no_headless: bool,
    },
    /// One-shot scrape of the current listing, without alerting or persistence
    Scrape {
        #[arg(long, help = "City name to filter tenders (scrapes all when omitted)")]
        city: Option<String>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,

        #[arg(long, help = "Write the output to a file instead of stdout")]
        out: Option<PathBuf>,

        #[arg(
            long = "timeout-secs",
            default_value_t = 30,
            help = "Bound for page waits, in seconds"
        )]
        timeout_secs: u64,

        #[arg(long = "no-headless", help = "Run the browser in visible mode")]
        no_headless: bool,
    },
    /// Alert on every currently listed tender for a city, ignoring the history store
    SendAll {
        #[arg(long, help = "City name to filter tenders")]
        city: String,

        #[arg(
            long = "chat-to",
            env = "TWILIO_WHATSAPP_TO",
            help = "WhatsApp recipient for alerts"
        )]
        chat_to: Option<String>,

        #[arg(
            long = "email-to",
            env = "GMAIL_SMTP_TO",
            help = "Email recipient for alerts"
        )]
        email_to: Option<String>,

        #[arg(
            long = "timeout-secs",
            default_value_t = 30,
            help = "Bound for page waits, in seconds"
        )]
        timeout_secs: u64,

        #[arg(long = "no-headless", help = "Run the browser in visible mode")]
        no_headless: bool,
    },
}

fn render_text(tenders: &[Tender]) -> String {
    if tenders.is_empty() {
        return "No tenders to display.\n".to_string();
    }
    let mut out = String::new();
    for (i, tender) in tenders.iter().enumerate() {
        out.push_str(&format!("{:>3}. {tender}\n", i + 1));
    }
    out.push_str(&format!("\nTotal: {}\n", tenders.len()));
    out
}

async fn run(command: Commands) -> ExitCode {
    match command {
        Commands::Monitor {
            city,
            chat_to,
            email_to,
            store,
            timeout_secs,
            no_headless,
        } => {
            let config = MonitorConfig {
                city,
                chat_to,
                email_to,
                headless: !no_headless,
                store_path: store,
                timeout: Duration::from_secs(timeout_secs),
            };

            let monitor = match Monitor::from_env(config) {
                Ok(monitor) => monitor,
                Err(e) => {
                    log::error!("configuration error: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let report = monitor.run().await;
            print!("{report}");
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Scrape {
            city,
            format,
            out,
            timeout_secs,
            no_headless,
        } => {
            let config = MonitorConfig {
                city,
                headless: !no_headless,
                timeout: Duration::from_secs(timeout_secs),
                ..MonitorConfig::default()
            };

            let tenders = match monitor::scrape(&config).await {
                Ok(tenders) => tenders,
                Err(e) => {
                    log::error!("scrape failed: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let rendered = match format {
                OutputFormat::Text => render_text(&tenders),
                OutputFormat::Csv => store::to_csv(&tenders),
                OutputFormat::Json => match serde_json::to_string_pretty(&tenders) {
                    Ok(json) => json,
                    Err(e) => {
                        log::error!("error serializing to JSON: {e}");
                        return ExitCode::FAILURE;
                    }
                },
            };

            match out {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, rendered) {
                        log::error!("could not write {}: {e}", path.display());
                        return ExitCode::FAILURE;
                    }
                    log::info!("wrote {} tender(s) to {}", tenders.len(), path.display());
                    ExitCode::SUCCESS
                }
                None => {
                    println!("{rendered}");
                    ExitCode::SUCCESS
                }
            }
        }

        Commands::SendAll {
            city,
            chat_to,
            email_to,
            timeout_secs,
            no_headless,
        } => {
            let config = MonitorConfig {
                city: Some(city),
                chat_to,
                email_to,
                headless: !no_headless,
                timeout: Duration::from_secs(timeout_secs),
                ..MonitorConfig::default()
            };

            let monitor = match Monitor::from_env(config) {
                Ok(monitor) => monitor,
                Err(e) => {
                    log::error!("configuration error: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let report = monitor.send_all().await;
            print!("{report}");
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    // On Ctrl-C the run future is dropped, but the runtime still waits for
    // the in-flight blocking scrape whose scope owns the browser, so
    // Chrome is shut down before the process exits.
    tokio::select! {
        code = run(cli.command) => code,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted, shutting down");
            ExitCode::from(130)
        }
    }
}
