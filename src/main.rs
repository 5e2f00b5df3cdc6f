//! quotemate CLI.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use quotemate::cleanup::cleanup_old_files;
use quotemate::notify::TelegramSink;
use quotemate::pricing::format_cost_summary;
use quotemate::quote::QuoteId;
use quotemate::{QuoteJob, QuoteOrchestrator, QuoteOutcome, QuoteRequest, QuoteWorker, Settings};

#[derive(Parser)]
#[command(name = "quotemate")]
#[command(about = "3D print quotes from OrcaSlicer estimates", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (defaults to the per-user config if present)
    #[arg(short, long, global = true, env = "QUOTEMATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Slice a model and produce a quote
    Quote {
        /// Model file (STL, OBJ or STEP). A copy is quoted; the original is kept.
        #[arg(short, long)]
        file: PathBuf,
        /// Customer name
        #[arg(long)]
        name: String,
        /// Customer mobile number
        #[arg(long)]
        mobile: String,
        /// Material id, e.g. PLA, PETG, ASA
        #[arg(long)]
        material: Option<String>,
        /// Filament color
        #[arg(long)]
        color: Option<String>,
        /// Do not verify profile files before slicing
        #[arg(long)]
        skip_profile_check: bool,
    },
    /// List materials with a profile or a configured price
    Materials,
    /// Delete old uploads
    Cleanup {
        /// Override `uploads.max_age_hours`
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
    /// Check slicer, profiles and Telegram configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    quotemate::init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Quote {
            file,
            name,
            mobile,
            material,
            color,
            skip_profile_check,
        } => {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("Model path has no file name")?;
            let request = QuoteRequest {
                name,
                mobile,
                material,
                color,
                filename,
            };
            quote(&settings, &file, request, skip_profile_check).await
        }
        Commands::Materials => {
            materials(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cleanup { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(settings.uploads.max_age_hours);
            let stats = cleanup_old_files(&settings.uploads.dir, Duration::from_secs(hours * 3600))
                .with_context(|| format!("Cleanup of {:?} failed", settings.uploads.dir))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => check(&settings).await,
    }
}

async fn quote(
    settings: &Settings,
    model: &Path,
    request: QuoteRequest,
    skip_profile_check: bool,
) -> Result<ExitCode> {
    if !model.is_file() {
        bail!("Model file not found: {}", model.display());
    }

    let orchestrator = QuoteOrchestrator::from_settings(settings)?;
    if !skip_profile_check {
        orchestrator
            .profiles()
            .check_configured()
            .context("Slicer profiles are incomplete (use --skip-profile-check to ignore)")?;
    }

    // The orchestrator consumes its upload, so quote a copy.
    let upload = stage_upload(&settings.uploads.dir, model, &request.filename)?;
    info!("Staged {:?} as {:?}", model, upload);

    let worker = QuoteWorker::new(Arc::new(orchestrator), settings.worker.max_concurrent_quotes);
    let outcome = worker
        .submit(QuoteJob {
            model_path: upload,
            request,
        })
        .outcome()
        .await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    match outcome {
        QuoteOutcome::Success(success) => {
            println!();
            println!(
                "{}",
                format_cost_summary(&success.cost_breakdown, &settings.pricing.currency)
            );
            Ok(ExitCode::SUCCESS)
        }
        QuoteOutcome::Failure(_) => Ok(ExitCode::FAILURE),
    }
}

fn stage_upload(dir: &Path, model: &Path, filename: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let target = dir.join(format!("{}_{}", QuoteId::generate().short(), filename));
    std::fs::copy(model, &target)
        .with_context(|| format!("Failed to copy {:?} to {:?}", model, target))?;
    Ok(target)
}

fn materials(settings: &Settings) -> Result<()> {
    let orchestrator = QuoteOrchestrator::from_settings(settings)?;
    let pricing = orchestrator.pricing();

    let mut materials = orchestrator.profiles().available_materials();
    for material in pricing.config().material_prices.keys() {
        if !materials.contains(material) {
            materials.push(material.clone());
        }
    }
    materials.sort();

    for material in materials {
        let profile = if orchestrator.profiles().has_profile(&material) {
            ""
        } else {
            "  (no profile)"
        };
        println!(
            "{:<8} {}{:.2}/kg{}",
            material,
            pricing.config().currency,
            pricing.price_per_kg(&material),
            profile
        );
    }
    Ok(())
}

async fn check(settings: &Settings) -> Result<ExitCode> {
    let mut ok = true;

    if settings.slicer.cli_path.exists() {
        println!("slicer:   ok ({})", settings.slicer.cli_path.display());
    } else {
        ok = false;
        println!("slicer:   missing ({})", settings.slicer.cli_path.display());
    }

    let orchestrator = QuoteOrchestrator::from_settings(settings)?;
    match orchestrator.profiles().check_configured() {
        Ok(()) => println!("profiles: ok"),
        Err(e) => {
            ok = false;
            println!("profiles: {}", e);
        }
    }

    match (&settings.telegram.bot_token, &settings.telegram.admin_chat_id) {
        (Some(token), Some(_)) => {
            let sink = TelegramSink::new(&settings.telegram.api_base, token)?;
            if sink.check_connection().await {
                println!("telegram: ok");
            } else {
                ok = false;
                println!("telegram: connection failed");
            }
        }
        (Some(_), None) => {
            warn!("Telegram bot token set without an admin chat id");
            println!("telegram: no admin chat id, notifications are logged only");
        }
        _ => println!("telegram: not configured, notifications are logged only"),
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
