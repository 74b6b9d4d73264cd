use anyhow::{bail, Context, Result};
use ce_monitor::{
    days_before, write_events_csv, AlertDispatcher, BackfillMode, BackfillOrchestrator, ChangeEvent,
    ChangeLedger, Config, DirectoryFetcher, LogSink, Monitor, SnapshotStore, Source,
};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ce-monitor",
    version,
    about = "Track Caveat Emptor / Expert Market entries and exits"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill the trailing window, then detect today's changes and alert.
    Track {
        /// Date to track (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fill in historical observations for one list.
    Backfill {
        /// CE or EM.
        #[arg(long)]
        source: Source,

        /// First date (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Last date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,

        /// Re-run detection for every date and record the changes found.
        #[arg(long, default_value_t = false)]
        redetect: bool,
    },
    /// Show recorded entries and exits.
    Report {
        /// Events on this date. Defaults to today.
        #[arg(long, conflicts_with = "since")]
        date: Option<NaiveDate>,

        /// Events on or after this date.
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false, conflicts_with = "csv")]
        json: bool,

        /// Print CSV instead of text.
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Tickers seen on either list during the last N days.
    Listed {
        /// Window size. Defaults to report_days from config.
        #[arg(long)]
        days: Option<u32>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let conn = ce_monitor::open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    match cli.command {
        Commands::Track { date } => run_track(&conn, &config, date.unwrap_or_else(today)),
        Commands::Backfill {
            source,
            start,
            end,
            redetect,
        } => run_backfill(&conn, &config, source, start, end, redetect),
        Commands::Report {
            date,
            since,
            json,
            csv,
        } => run_report(&conn, date, since, json, csv),
        Commands::Listed { days } => run_listed(&conn, days.unwrap_or(config.report_days)),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn run_track(conn: &Connection, config: &Config, date: NaiveDate) -> Result<()> {
    println!("🛰️  Tracking CE / Expert Market lists for {}", date);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let fetcher = DirectoryFetcher::new(&config.compliance_dir);
    println!("📂 Compliance data: {}", fetcher.dir().display());
    let dispatcher = AlertDispatcher::new(config.alerts.clone(), LogSink);
    let monitor = Monitor::new(conn, &fetcher, &dispatcher).with_backfill_days(config.backfill_days);

    let report = monitor.run_daily(date)?;

    for backfill in &report.backfill {
        println!("✓ Backfill {}", backfill.summary());
    }

    for entry in &report.changes {
        let changes = &entry.changes;
        if changes.is_empty() {
            println!("\n{}: no changes", entry.source);
            continue;
        }
        if !changes.entered.is_empty() {
            println!("\n🆕 {} entries: {}", entry.source, changes.entered.join(", "));
        }
        if !changes.exited.is_empty() {
            println!("\n✅ {} exits: {}", entry.source, changes.exited.join(", "));
        }
    }

    for skipped in &report.skipped {
        eprintln!("\n⚠️  {} skipped: {}", skipped.source, skipped.reason);
    }

    println!(
        "\nAlerts: {} sent, {} suppressed, {} failed",
        report.alerts.sent, report.alerts.suppressed, report.alerts.failed
    );

    if !report.skipped.is_empty() {
        bail!("{} list(s) could not be fetched for {}", report.skipped.len(), date);
    }

    Ok(())
}

fn run_backfill(
    conn: &Connection,
    config: &Config,
    source: Source,
    start: NaiveDate,
    end: NaiveDate,
    redetect: bool,
) -> Result<()> {
    let fetcher = DirectoryFetcher::new(&config.compliance_dir);
    let mode = if redetect {
        BackfillMode::Redetect
    } else {
        BackfillMode::ObservationsOnly
    };

    let report = BackfillOrchestrator::new(conn, &fetcher)
        .with_mode(mode)
        .backfill(source, start, end)?;

    println!("✓ {}", report.summary());
    for (date, changes) in &report.changes {
        println!(
            "  {}: +[{}] -[{}]",
            date,
            changes.entered.join(", "),
            changes.exited.join(", ")
        );
    }
    for failed in &report.failed {
        eprintln!("  ✗ {}: {}", failed.date, failed.reason);
    }

    Ok(())
}

fn run_report(
    conn: &Connection,
    date: Option<NaiveDate>,
    since: Option<NaiveDate>,
    json: bool,
    csv: bool,
) -> Result<()> {
    let ledger = ChangeLedger::new(conn);
    let events: Vec<ChangeEvent> = match since {
        Some(since) => ledger.events_since(since)?,
        None => ledger.events_on(date.unwrap_or_else(today))?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else if csv {
        write_events_csv(std::io::stdout().lock(), &events)?;
    } else if events.is_empty() {
        println!("No entries or exits recorded.");
    } else {
        for event in &events {
            println!(
                "  {} [{}] {:<5} {}",
                event.date,
                event.source.code(),
                event.kind,
                event.ticker
            );
        }
    }

    Ok(())
}

fn run_listed(conn: &Connection, days: u32) -> Result<()> {
    let since = days_before(today(), days)?;
    let listed = SnapshotStore::new(conn).listed_since(since)?;

    println!("📅 Listed on CE / Expert Market since {}:", since);
    for seen in &listed {
        println!("  [{}] {:<6} last seen {}", seen.source.code(), seen.ticker, seen.date);
    }
    println!("✓ {} tickers", listed.len());

    Ok(())
}
