use anyhow::{bail, Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tally_core::ReportingWindow;
use tally_ingest::parse_ledger_csv;
use tally_live::{discover_years, Dashboard, LiveQueryBinder, LogReporter, MemorySource, Publisher, Session, WindowSelector};
use tokio::io::{AsyncBufReadExt, BufReader};

mod config;
mod render;
mod state;

use config::Config;
use render::{report_json, report_text, ColorMode};

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")"),
    about = "Income and expense reports from a transaction ledger"
)]
struct Cli {
    /// IANA timezone for window bounds and day keys (overrides config)
    #[arg(long, global = true)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the report for one window
    Report {
        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        period: PeriodArgs,

        /// Print chart-shaped JSON instead of text bars
        #[arg(long)]
        json: bool,

        /// Chart colors for --json (overrides config)
        #[arg(long, value_enum)]
        color_mode: Option<ColorMode>,
    },

    /// List the years that have transactions for the user
    Years {
        #[command(flatten)]
        ledger: LedgerArgs,
    },

    /// Keep the report live while the CSV changes. Type `YYYY`, `YYYY MM`,
    /// `MM` or `year` on stdin to switch windows.
    Watch {
        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        period: PeriodArgs,

        /// Poll interval in milliseconds (overrides config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tally/config.toml with defaults
    Init,
}

#[derive(clap::Args, Debug)]
struct LedgerArgs {
    /// Ledger CSV (id,user_id,amount,date,category)
    #[arg(long)]
    csv: PathBuf,

    /// User whose transactions are reported (defaults to [report] user)
    #[arg(long)]
    user: Option<String>,
}

#[derive(clap::Args, Debug)]
struct PeriodArgs {
    /// Calendar year; alone it selects the whole year
    #[arg(long)]
    year: Option<i32>,

    /// Month 1-12
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Command::Config { command } = &cli.command {
        match command {
            ConfigCommand::Init => config::init_config()?,
        }
        return Ok(());
    }

    let cfg = config::load_config()?;
    let tz = match &cli.timezone {
        Some(name) => tally_core::time::parse_timezone(name)?,
        None => cfg.timezone()?,
    };

    match cli.command {
        Command::Report {
            ledger,
            period,
            json,
            color_mode,
        } => {
            let user = resolve_user(ledger.user, &cfg)?;
            let window = resolve_window(period.year, period.month, tz)?;
            let mode = color_mode.unwrap_or(cfg.report.color_mode);
            run_report(&ledger.csv, &user, window, tz, json, mode).await?;
        }

        Command::Years { ledger } => {
            let user = resolve_user(ledger.user, &cfg)?;
            let source = load_source(&ledger.csv)?;
            let years = discover_years(&source, Some(&user), tz, &LogReporter).await;
            if years.is_empty() {
                println!("No transactions for {user}");
            }
            for y in years {
                println!("{y}");
            }
        }

        Command::Watch {
            ledger,
            period,
            interval_ms,
        } => {
            let user = resolve_user(ledger.user, &cfg)?;
            let window = resolve_window(period.year, period.month, tz)?;
            let every = Duration::from_millis(interval_ms.unwrap_or(cfg.watch.poll_interval_ms).max(50));
            run_watch(ledger.csv, user, window, tz, every).await?;
        }

        Command::Config { .. } => {}
    }

    Ok(())
}

fn resolve_user(flag: Option<String>, cfg: &Config) -> Result<String> {
    match flag.or_else(|| cfg.report.user.clone()) {
        Some(u) if !u.trim().is_empty() => Ok(u),
        _ => bail!("no user given (pass --user or set [report] user in config.toml)"),
    }
}

/// No flags: the current month. `--year` alone: that whole year. `--month`
/// alone: that month of the current year.
fn resolve_window(year: Option<i32>, month: Option<u32>, tz: Tz) -> Result<ReportingWindow> {
    let now = ReportingWindow::current_month(Utc::now(), tz);
    let window = match (year, month) {
        (None, None) => now,
        (Some(y), None) => ReportingWindow::year_only(y)?,
        (y, Some(m)) => ReportingWindow::new(y.unwrap_or(now.year()), Some(zero_based(m)?))?,
    };
    Ok(window)
}

fn zero_based(month: u32) -> Result<u32> {
    if !(1..=12).contains(&month) {
        bail!("month {month} is outside 1..=12");
    }
    Ok(month - 1)
}

fn load_source(csv: &Path) -> Result<MemorySource> {
    if !csv.exists() {
        bail!("CSV not found: {} (pass --csv <path>)", csv.display());
    }
    let records = parse_ledger_csv(csv)?;
    log::info!("loaded {} transactions from {}", records.len(), csv.display());
    Ok(MemorySource::with_records(records))
}

async fn run_report(csv: &Path, user: &str, window: ReportingWindow, tz: Tz, json: bool, mode: ColorMode) -> Result<()> {
    let source = Arc::new(load_source(csv)?);
    let binder = LiveQueryBinder::reports(source, Publisher::new(), tz);
    binder.bind(Some(user), window).await?;
    let report = binder.publisher().latest();
    binder.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report, mode))?);
    } else {
        print!("{}", report_text(&report));
    }
    Ok(())
}

async fn run_watch(csv: PathBuf, user: String, window: ReportingWindow, tz: Tz, every: Duration) -> Result<()> {
    let source = Arc::new(load_source(&csv)?);
    let selector = Arc::new(WindowSelector::new(window));
    let session = Session::signed_in(user);
    let mut years = selector.watch_years();
    let dashboard = Arc::new(Dashboard::new(source.clone(), selector, tz));

    let renderer = dashboard.reports().subscribe_with(|published| {
        println!("--- update {} ---", published.version);
        print!("{}", report_text(&published.value));
    });
    let year_list = tokio::spawn(async move {
        while years.changed().await.is_ok() {
            let list: Vec<String> = years.borrow_and_update().iter().map(|y| y.to_string()).collect();
            println!("years with data: {}", list.join(", "));
        }
    });
    let poller = tokio::spawn(poll_csv(csv, source, every));
    let input = tokio::spawn(read_periods(dashboard.clone()));

    dashboard
        .run(session.watch(), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    input.abort();
    poller.abort();
    year_list.abort();
    renderer.abort();
    Ok(())
}

/// Reload the CSV whenever its mtime moves and push the new record set
/// into the source.
async fn poll_csv(path: PathBuf, source: Arc<MemorySource>, every: Duration) {
    let mut seen = modified(&path);
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tick.tick().await;
        let now = modified(&path);
        if now == seen {
            continue;
        }
        seen = now;
        match parse_ledger_csv(&path) {
            Ok(records) => {
                log::info!("reloaded {} transactions from {}", records.len(), path.display());
                source.replace_all(records);
            }
            Err(e) => log::warn!("reload failed, keeping previous records: {e:#}"),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

async fn read_periods(dashboard: Arc<Dashboard<MemorySource>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let selected = match parse_period(&line) {
            Ok(PeriodInput::Period(year, month)) => dashboard.select(year, month),
            Ok(PeriodInput::Month(month)) => dashboard.select_month(month),
            Err(e) => {
                eprintln!("{e:#}");
                continue;
            }
        };
        if let Err(e) = selected {
            eprintln!("{e}");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PeriodInput {
    /// Year and zero-based month.
    Period(i32, Option<u32>),
    /// Zero-based month of the selected year; `None` for the whole year.
    Month(Option<u32>),
}

/// "2024" | "2024 3" | "2024-03" | "3" (month of the selected year) | "year"
fn parse_period(line: &str) -> Result<PeriodInput> {
    const USAGE: &str = "expected YYYY, YYYY MM, MM or `year`";

    let line = line.trim();
    if line.eq_ignore_ascii_case("year") {
        return Ok(PeriodInput::Month(None));
    }

    let mut parts = line.split(|c: char| c == '-' || c.is_whitespace()).filter(|p| !p.is_empty());
    let first = parts.next().context(USAGE)?.parse::<i32>().context(USAGE)?;
    let month = match parts.next() {
        Some(m) => Some(zero_based(m.parse::<u32>().context("month is not a number")?)?),
        None => None,
    };
    if parts.next().is_some() {
        bail!(USAGE);
    }

    match (u32::try_from(first), month) {
        (Ok(m @ 1..=12), None) => Ok(PeriodInput::Month(Some(m - 1))),
        _ => Ok(PeriodInput::Period(first, month)),
    }
}
