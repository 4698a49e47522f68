use anyhow::Context;
use clap::Parser;
use fairrank::{
    display_ranking, format_explanation_for_hr, CandidateInput, FileNameResolver, HashingEmbedder,
    PersistenceContext, Pipeline, PipelineConfig,
};
use fairrank_core::ExtractionError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Explainable, debiased candidate ranking
#[derive(Parser, Debug)]
#[command(name = "fairrank")]
#[command(about = "Rank resumes against a job description", long_about = None)]
struct Args {
    /// Path to the job description text file
    #[arg(short, long)]
    job_description: PathBuf,

    /// Directory of extracted resume texts (*.txt)
    #[arg(short, long)]
    candidates_dir: PathBuf,

    /// Job identifier, names the output subdirectory
    #[arg(long)]
    job_id: String,

    /// Root of the per-job output directories
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debiasing strength in [0, 1], overrides the config file
    #[arg(long)]
    lambda_bias: Option<f32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fairrank v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let job_description = fs::read_to_string(&args.job_description)
        .with_context(|| format!("reading {}", args.job_description.display()))?;
    let candidates = read_candidates(&args.candidates_dir)?;
    info!("Loaded {} candidates from {:?}", candidates.len(), args.candidates_dir);

    let context = PersistenceContext::new(args.output_dir.join(&args.job_id))?;
    info!("Output directory: {:?}", context.root());
    let pipeline = Pipeline::new(config, Arc::new(HashingEmbedder::default()), context)?;

    let report = pipeline.run(&job_description, &candidates)?;
    if report.retrained {
        info!("Model retrained for job hash {}", report.job_hash);
    }
    for skipped in &report.skipped {
        warn!("Skipped {}: {}", skipped.identity.display_name, skipped.reason);
    }

    println!("\nCandidate Ranking Results:");
    for line in display_ranking(&pipeline.context().ranking_path())? {
        println!("{line}");
    }

    let job_title = args
        .job_description
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.job_id.clone());
    for ranked in &report.rankings {
        if let Some(candidate) = report
            .candidates
            .iter()
            .find(|c| c.identity.candidate_id == ranked.candidate_id)
        {
            println!();
            println!(
                "{}",
                format_explanation_for_hr(&candidate.attribution, &ranked.display_name, &job_title)
            );
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match (&args.config, args.lambda_bias) {
        (Some(path), _) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        (None, Some(lambda_bias)) => PipelineConfig::new(lambda_bias),
        (None, None) => anyhow::bail!("--lambda-bias is required when no --config is given"),
    };
    if let Some(lambda_bias) = args.lambda_bias {
        config.lambda_bias = lambda_bias;
    }
    config.validate()?;
    Ok(config)
}

/// Every `*.txt` file in `dir`, sorted by file name
fn read_candidates(dir: &Path) -> anyhow::Result<Vec<CandidateInput>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt")))
        .collect();
    paths.sort();

    let resolver = FileNameResolver;
    Ok(paths
        .iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_string_lossy().into_owned();
            let text = fs::read_to_string(path).map_err(|e| ExtractionError::Failed(e.to_string()));
            Some(CandidateInput::from_file(&resolver, &file_name, text))
        })
        .collect())
}
