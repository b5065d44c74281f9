use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use casesplit::{start_batch, BackendPool, BatchRequest, ExtractionProfile};
use casesplit::ocr::OcrConfig;
use casesplit::profile::builtin_profiles;

/// Split scanned legal PDFs into identifier-named single-page files.
#[derive(Parser)]
#[command(name = "casesplit", version, about)]
struct Cli {
    /// Folder of scanned PDFs to process.
    input: Option<PathBuf>,

    /// Document-type profile id (see --list-profiles).
    #[arg(short, long)]
    profile: Option<String>,

    /// Output folder. Defaults to <input>/extracted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Audit log folder. Defaults to the output folder.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Only process files whose name contains this substring
    /// (case-insensitive). Overrides the profile default.
    #[arg(long)]
    filter: Option<String>,

    /// List the builtin profiles and exit.
    #[arg(long)]
    list_profiles: bool,

    /// Print a builtin profile's full configuration as JSON and exit.
    #[arg(long, value_name = "ID")]
    dump_profile: Option<String>,

    /// Tesseract binary for the structured backend.
    #[arg(long)]
    tesseract: Option<String>,

    /// Detection model for the resilient backend.
    #[arg(long)]
    det_model: Option<PathBuf>,

    /// Recognition model for the resilient backend.
    #[arg(long)]
    rec_model: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_profiles {
        for profile in builtin_profiles() {
            let filter = profile.filename_filter.as_deref().unwrap_or("-");
            println!(
                "{:<20} backend={:<10} filter={}",
                profile.id, profile.backend, filter
            );
        }
        return Ok(());
    }

    if let Some(id) = &cli.dump_profile {
        let profile =
            ExtractionProfile::builtin(id).with_context(|| format!("unknown profile '{id}'"))?;
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    let input = cli.input.context("input folder required (see --help)")?;
    let profile_id = cli
        .profile
        .context("--profile required; --list-profiles shows the available ids")?;
    let profile = ExtractionProfile::builtin(&profile_id)
        .with_context(|| format!("unknown profile '{profile_id}'"))?;

    let output = cli.output.unwrap_or_else(|| input.join("extracted"));
    let log_dir = cli.log_dir.unwrap_or_else(|| output.clone());

    let mut ocr_config = OcrConfig::default();
    if cli.tesseract.is_some() {
        ocr_config.tesseract_binary = cli.tesseract;
    }
    if let Some(det) = cli.det_model {
        ocr_config.det_model = det;
    }
    if let Some(rec) = cli.rec_model {
        ocr_config.rec_model = rec;
    }
    let pool = Arc::new(BackendPool::new(ocr_config));

    let request = BatchRequest {
        input_dir: input,
        output_root: output,
        log_dir,
        profile,
        filename_filter: cli.filter,
    };

    let progress = Box::new(|percent: f32| {
        eprint!("\rprogress: {percent:5.1}%");
        let _ = std::io::stderr().flush();
    });

    let handle = start_batch(request, pool, Some(progress))?;
    let outcome = handle.join().context("batch worker panicked")?;
    eprintln!();

    println!(
        "{:?}: {} pages across {} documents, {} matched, {} documents failed",
        outcome.status,
        outcome.pages_processed,
        outcome.documents_processed,
        outcome.pages_matched,
        outcome.documents_failed
    );
    if let Some(log) = &outcome.log_path {
        println!("log:    {}", log.display());
    }
    match (&outcome.report_path, &outcome.report_error) {
        (Some(report), _) => println!("report: {}", report.display()),
        (None, Some(err)) => eprintln!("report failed: {err}"),
        _ => {}
    }

    Ok(())
}
