use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod dates;
mod db;
mod email;
mod html;
mod import;
mod listing;
mod mailer;
mod mapping;
mod models;
mod options;
mod reminders;
mod report;
mod scheduler;
mod store;
mod tabular;
mod web;

use config::Config;
use db::PgStore;
use models::ImportSummary;
use options::RuntimeSettings;
use store::ScholarshipStore;

#[derive(Parser)]
#[command(name = "aviation-scholarships")]
#[command(about = "Aviation scholarship importer and deadline reminder service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo users, scholarships and favorites
    Seed,
    /// Import scholarships from a local CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import scholarships from a CSV URL
    ImportUrl {
        #[arg(long)]
        url: String,
    },
    /// Send due deadline reminders now
    Remind,
    /// Show reminder statistics
    Stats,
    /// Write a markdown status report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the import log, newest first
    Logs,
    /// Delete reminder records older than the given number of days
    Cleanup {
        #[arg(
            long,
            default_value_t = web::admin::DEFAULT_CLEANUP_DAYS,
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        days: i64,
    },
    /// Delete a scholarship and its reminder records
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// Run the HTTP server with the reminder and auto-sync schedulers
    Serve,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(err) = app_main().await {
        error!(?err, "application error");
        std::process::exit(1);
    }
}

async fn app_main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let summary = db::seed(&pool, today()).await?;
            println!(
                "Seed data loaded. Created: {}, Updated: {}",
                summary.created, summary.updated
            );
        }
        Commands::Import { csv } => {
            println!("Starting import from file: {}", csv.display());
            let summary = import::import_file(&PgStore::new(pool.clone()), &csv, today())
                .await
                .context("Import failed.")?;
            finish_import(&pool, &summary).await?;
        }
        Commands::ImportUrl { url } => {
            println!("Starting import from URL: {url}");
            let client = reqwest::Client::new();
            let summary = import::import_url(&PgStore::new(pool.clone()), &client, &url, today())
                .await
                .context("Import failed.")?;
            finish_import(&pool, &summary).await?;
        }
        Commands::Remind => {
            let settings = RuntimeSettings::load(&pool).await?;
            let mailer = mailer::from_config(reqwest::Client::new(), &config.mail);
            let outcome = scheduler::run_reminder_job(
                &pool,
                mailer.as_ref(),
                &config.site,
                &settings,
                today(),
            )
            .await?;
            println!("{}", outcome.message);
            for (bucket, count) in &outcome.breakdown {
                println!("- {bucket}: {count}");
            }
        }
        Commands::Stats => {
            let stats = db::reminder_stats(&pool, scheduler::next_reminder_run()).await?;
            println!("Total reminders sent: {}", stats.total_sent);
            for (bucket, count) in &stats.by_type {
                println!("- {}-day: {count}", bucket.days());
            }
            println!("Sent in the last 30 days: {}", stats.last_30_days);
            match stats.last_run {
                Some(at) => println!("Last run: {at}"),
                None => println!("Last run: never"),
            }
            if let Some(next) = stats.next_scheduled {
                println!("Next scheduled: {next}");
            }
        }
        Commands::Report { out } => {
            let stats = db::reminder_stats(&pool, scheduler::next_reminder_run()).await?;
            let last_import: Option<ImportSummary> =
                options::get(&pool, options::LAST_IMPORT_SUMMARY).await?;
            let last_run: Option<reminders::RunOutcome> =
                options::get(&pool, options::LAST_REMINDER_RUN).await?;
            let logs = options::import_logs(&pool).await?;

            let report = report::build_report(&report::ReportInput {
                generated_at: Utc::now(),
                scholarship_count: db::scholarship_count(&pool).await?,
                stats: &stats,
                last_import: last_import.as_ref(),
                last_run: last_run.as_ref(),
                logs: &logs,
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Logs => {
            let logs = options::import_logs(&pool).await?;
            if logs.is_empty() {
                println!("No import log entries.");
            }
            for entry in logs.iter().rev() {
                println!(
                    "{} [{:?}] {}",
                    entry.at.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.message
                );
            }
        }
        Commands::Cleanup { days } => {
            let removed = db::cleanup_old_reminders(&pool, days).await?;
            println!("Removed {removed} reminder records older than {days} days.");
        }
        Commands::Delete { id } => {
            if PgStore::new(pool.clone()).delete_scholarship(id).await? {
                println!("Deleted scholarship {id}.");
            } else {
                println!("No scholarship with id {id}.");
            }
        }
        Commands::Serve => serve(config, pool).await?,
    }

    Ok(())
}

async fn finish_import(pool: &PgPool, summary: &ImportSummary) -> Result<()> {
    options::set(pool, options::LAST_IMPORT_SUMMARY, summary).await?;
    println!(
        "Import completed. Created: {}, Updated: {}",
        summary.created, summary.updated
    );
    if !summary.errors.is_empty() {
        println!("Some rows had issues:");
        for err in &summary.errors {
            println!("- {err}");
        }
    }
    Ok(())
}

async fn serve(config: Config, pool: PgPool) -> Result<()> {
    db::init_db(&pool)
        .await
        .context("failed to run database migrations")?;

    let port = config.port;
    let state = web::AppState::new(config, pool).await?;
    scheduler::spawn(state.clone());

    let app = web::router::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "listening");

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn today() -> chrono::NaiveDate {
    Local::now().date_naive()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
