//! The `aerograde` CLI.
//!
//! Grades a corpus of model replies against the avionics schema and writes
//! per-sample records, per-task summaries, and per-model profiles.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use aerograde_core::{EvalConfig, TaskId};
use aerograde_runtime::{
    AdjudicatorKind, JudgeConfig, LlmJudge, OpenAiProvider, RunOptions, Runner,
};

#[derive(Parser)]
#[command(name = "aerograde")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evidence-driven grading of flight-state predictions", long_about = None)]
struct Cli {
    /// Task to evaluate: S1, M1, M3, or all
    #[arg(long, default_value = "all")]
    task: String,

    /// Directory for records, summaries, and profiles
    #[arg(long)]
    output_dir: PathBuf,

    /// Corpus base directory (replies/ and reference/ live under it)
    #[arg(long, default_value = "data")]
    corpus_dir: PathBuf,

    /// Restrict evaluation to these models (default: every model found)
    #[arg(long)]
    models: Vec<String>,

    /// Cap on samples per (task, model)
    #[arg(long)]
    samples_per_model: Option<usize>,

    /// Path to an EvalConfig JSON file (default: built-in configuration)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Adjudicator: rule or llm
    #[arg(long, default_value = "rule")]
    adjudicator: String,

    /// Judge model identifier (llm adjudicator only)
    #[arg(long, default_value = "gpt-4o")]
    judge_model: String,

    /// Confidence-prior JSON file for model profiles
    #[arg(long)]
    confidence: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_tasks(task: &str) -> Result<Vec<TaskId>> {
    if task.eq_ignore_ascii_case("all") {
        return Ok(TaskId::ALL.to_vec());
    }
    let parsed = task
        .parse::<TaskId>()
        .map_err(|e| anyhow::anyhow!("invalid --task: {}", e))?;
    Ok(vec![parsed])
}

fn parse_adjudicator(adjudicator: &str) -> Result<AdjudicatorKind> {
    match adjudicator.to_ascii_lowercase().as_str() {
        "rule" => Ok(AdjudicatorKind::Rule),
        "llm" => Ok(AdjudicatorKind::Llm),
        other => bail!("invalid --adjudicator: {} (expected rule or llm)", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to initialize logging")?;

    let tasks = parse_tasks(&cli.task)?;
    let adjudicator = parse_adjudicator(&cli.adjudicator)?;

    let config = match &cli.config {
        Some(path) => EvalConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EvalConfig::default(),
    };

    let judge = match adjudicator {
        AdjudicatorKind::Rule => None,
        AdjudicatorKind::Llm => {
            let provider =
                Arc::new(OpenAiProvider::from_env().context("configuring the LLM judge")?);
            let mut judge_config = JudgeConfig::default();
            judge_config.completion.model = cli.judge_model.clone();
            Some(LlmJudge::new(provider, judge_config))
        }
    };

    let options = RunOptions {
        tasks,
        output_dir: cli.output_dir,
        models: if cli.models.is_empty() {
            None
        } else {
            Some(cli.models)
        },
        samples_per_model: cli.samples_per_model,
        confidence_path: cli.confidence,
    };

    let runner = Runner::new(config, cli.corpus_dir, judge, options)?;
    let report = runner.run().await?;

    tracing::info!(
        records = report.total_records,
        models = report.models.len(),
        output = %report.output_dir.display(),
        "run complete"
    );
    Ok(())
}
