//! photosync: keep a Google Photos library in step with a local photo tree.
//!
//! `sync` lists the remote library once, then uploads every local photo whose
//! filename is missing from it (raw upload followed by registration). OAuth
//! tokens are refreshed transparently on a 401 and persisted atomically.
//! `import` files camera cards into a dated archive by EXIF capture time.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod import;
mod library;
mod shutdown;
mod state;
mod types;
mod upload;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use auth::InstalledAppFlow;
use cli::{AuthArgs, Command, ImportArgs, SyncArgs};
use config::Config;
use state::{Ledger, SqliteLedger, SyncRunStats};
use upload::{SyncSummary, UploadPipeline};

fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("photosync/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(config.http_timeout)
        .build()?;
    Ok(client)
}

/// Open the ledger, or continue without one.
async fn open_ledger(config: &Config) -> Option<SqliteLedger> {
    if let Err(e) = tokio::fs::create_dir_all(&config.config_dir).await {
        tracing::warn!(
            "Could not create {}: {}; continuing without ledger",
            config.config_dir.display(),
            e
        );
        return None;
    }
    match SqliteLedger::open(&config.db_path).await {
        Ok(ledger) => Some(ledger),
        Err(e) => {
            tracing::warn!("{}; continuing without ledger", e);
            None
        }
    }
}

async fn authenticate(config: &Config, auth_port: u16) -> anyhow::Result<auth::AuthClient> {
    let http = build_http_client(config)?;
    let consent = InstalledAppFlow::new(http.clone(), auth_port);
    auth::authenticate(
        &config.credentials_path,
        &config.tokens_path,
        http,
        &consent,
    )
    .await
}

/// Run the sync command.
async fn run_sync(config: &Config, args: SyncArgs) -> anyhow::Result<()> {
    let directory = PathBuf::from(&args.directory);
    if !directory.is_dir() {
        anyhow::bail!("{} is not a directory", directory.display());
    }
    let upload_config = config.upload_config(&args)?;
    tracing::info!(
        concurrency = upload_config.threads,
        directory = %directory.display(),
        "Starting photosync"
    );

    let client = authenticate(config, args.auth_port).await?;
    let shutdown_token = shutdown::install_signal_handler()?;
    let started = Instant::now();

    tracing::info!("Loading library inventory...");
    let mut inventory = library::load_all(&client, &config.endpoints, args.page_size).await?;
    tracing::info!(
        distinct_filenames = inventory.len(),
        "{} items in library",
        inventory.item_count()
    );

    let ledger = if upload_config.dry_run {
        None
    } else {
        open_ledger(config).await
    };
    let ledger: Option<&dyn Ledger> = ledger.as_ref().map(|l| l as &dyn Ledger);

    let run_id = match ledger {
        Some(ledger) => match ledger.start_sync_run().await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not record sync run: {}", e);
                None
            }
        },
        None => None,
    };

    let recovered = match ledger {
        Some(ledger) => {
            upload::reconcile(&client, &config.endpoints, ledger, &mut inventory).await
        }
        None => 0,
    };

    let pipeline = UploadPipeline::new(&client, &config.endpoints, ledger, &upload_config);
    let mut summary = pipeline
        .sync(&directory, &inventory, shutdown_token)
        .await;
    summary.recovered = recovered;

    if let (Some(ledger), Some(run_id)) = (ledger, run_id) {
        let stats = SyncRunStats {
            remote_items: inventory.item_count() as u64,
            uploaded: summary.uploaded as u64,
            failed: summary.failed as u64,
            orphaned: summary.orphaned as u64,
            interrupted: summary.interrupted,
        };
        if let Err(e) = ledger.complete_sync_run(run_id, &stats).await {
            tracing::warn!("Could not record sync run: {}", e);
        }
    }

    log_summary(&summary, upload_config.dry_run, started.elapsed());

    let failed = summary.failed + summary.orphaned;
    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, summary.missing);
    }
    Ok(())
}

fn log_summary(summary: &SyncSummary, dry_run: bool, elapsed: Duration) {
    if dry_run {
        tracing::info!("── Dry Run Summary ──");
        tracing::info!("  {} files would be uploaded", summary.missing);
        return;
    }
    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} uploaded, {} failed, {} orphaned, {} already in library",
        summary.uploaded,
        summary.failed,
        summary.orphaned,
        summary.already_present
    );
    if summary.duplicates > 0 {
        tracing::info!("  {} local files skipped as same-name duplicates", summary.duplicates);
    }
    if summary.recovered > 0 {
        tracing::info!("  {} earlier uploads registered", summary.recovered);
    }
    if summary.interrupted {
        tracing::info!("  interrupted before all files were attempted");
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Run the import command.
async fn run_import(args: ImportArgs) -> anyhow::Result<()> {
    let input_dir = PathBuf::from(&args.input_dir);
    let output_dir = PathBuf::from(&args.output_dir);
    let import_config = import::ImportConfig {
        folder_structure: args.folder_structure,
        dry_run: args.dry_run,
    };

    let summary = tokio::task::spawn_blocking(move || {
        import::import_directory(&input_dir, &output_dir, &import_config)
    })
    .await??;

    tracing::info!(
        "Imported {} of {} files ({} already present, {} without date, {} failed)",
        summary.moved,
        summary.scanned,
        summary.already_exists,
        summary.undated,
        summary.failed
    );
    if summary.failed > 0 {
        anyhow::bail!("{} files could not be imported", summary.failed);
    }
    Ok(())
}

/// Run the auth command.
async fn run_auth(config: &Config, args: AuthArgs) -> anyhow::Result<()> {
    authenticate(config, args.auth_port).await?;
    tracing::info!(
        "Authentication completed successfully; tokens stored in {}",
        config.tokens_path.display()
    );
    Ok(())
}

/// Run the status command.
async fn run_status(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        println!("No ledger found at {}", db_path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let ledger = SqliteLedger::open(db_path)
        .await
        .with_context(|| format!("Opening ledger {}", db_path.display()))?;
    let summary = ledger.summary().await?;

    println!("Ledger: {}", db_path.display());
    println!();
    println!("Sync runs: {}", summary.total_runs);
    if let Some(started) = &summary.last_sync_started {
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(run) = &summary.last_run {
        println!();
        println!("Last completed run:");
        println!("  Library items: {}", run.remote_items);
        println!("  Uploaded:      {}", run.uploaded);
        println!("  Failed:        {}", run.failed);
        println!("  Orphaned:      {}", run.orphaned);
        if run.interrupted {
            println!("  (interrupted)");
        }
    }

    println!();
    println!("Pending registrations: {}", summary.pending_registrations);
    if summary.pending_registrations > 0 {
        for pending in ledger.pending_registrations().await? {
            println!(
                "  {} (uploaded {}) - {}",
                pending.local_path.display(),
                pending.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC"),
                pending.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = cli.global.log_level.as_filter();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(&cli.global)?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Command::Sync(args) => run_sync(&config, args).await,
        Command::Import(args) => run_import(args).await,
        Command::Auth(args) => run_auth(&config, args).await,
        Command::Status => run_status(&config.db_path).await,
    }
}
