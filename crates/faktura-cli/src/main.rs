//! `faktura` — command-line invoice extraction pipeline for Swedish PDF
//! invoices (spec §6: external interfaces). Grounded on `docling-cli`'s
//! `clap` derive shape, `colored` status lines, and `indicatif` progress bar,
//! scoped to this pipeline's run/import-corrections/patterns/calibrate
//! surface instead of docling's convert/batch/benchmark/watch commands.

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use faktura_ai::OpenAiLikeClient;
use faktura_calibrate::{validate, GroundTruthSample, IsotonicModel, WeightedSample};
use faktura_core::{Correction, JsonSerializer, ReportSerializer, Status, YamlSerializer};
use faktura_learn::{pattern_from_correction, PatternStore};
use faktura_pipeline::{rows_for_file, run_batch, write_review_package, ExportRow, FinalizedInvoice, PipelineContext, ReportBuilder};

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "faktura", version, about = "Swedish PDF invoice extraction pipeline")]
struct Cli {
    /// Path to a `.faktura.toml` profile; overrides the discovered user/project configs.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress progress output; only the final summary and errors are printed.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one PDF file or a directory of PDFs and emit a run report and tabular export.
    Run(RunArgs),
    /// Import a line-delimited corrections file into the pattern store.
    ImportCorrections(ImportCorrectionsArgs),
    /// Pattern store maintenance: consolidate near-duplicate patterns and retire stale ones.
    Patterns(PatternsArgs),
    /// Train or validate the isotonic confidence calibration model.
    Calibrate(CalibrateArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// A PDF file or a directory of PDFs (directory contents are processed
    /// in lexicographic order, non-PDF files skipped).
    input: PathBuf,

    /// Where to write the run report (spec §4.14). Defaults to
    /// `run-report.json` next to the current directory.
    #[arg(long, default_value = "run-report.json")]
    report: PathBuf,

    /// Serialize the run report as YAML instead of JSON.
    #[arg(long)]
    yaml: bool,

    /// Where to write the row-per-line-item tabular export (spec §6). Pass
    /// an empty string to skip writing it.
    #[arg(long, default_value = "export.csv")]
    export: PathBuf,

    /// Where to write the per-file errors sidecar, only created if at least
    /// one file failed fatally (spec §6, §7).
    #[arg(long, default_value = "errors.json")]
    errors: PathBuf,

    /// Directory under which a review package (source PDF, run report,
    /// validation blob, traceability snippets) is written per REVIEW invoice
    /// (spec §6 Outputs). Pass an empty string to skip writing them.
    #[arg(long, default_value = "review-packages")]
    review_dir: PathBuf,

    /// Abort the whole run at the first per-file fatal error instead of
    /// continuing and recording it in the errors sidecar.
    #[arg(long)]
    strict: bool,

    /// Disable the AI fallback for this run even if the resolved
    /// configuration enables it.
    #[arg(long)]
    no_ai: bool,
}

#[derive(clap::Args, Debug)]
struct ImportCorrectionsArgs {
    /// Newline-delimited JSON file of `Correction` records (spec §3, §9:
    /// "the append log is treated purely as an import artifact").
    input: PathBuf,
}

#[derive(clap::Args, Debug)]
struct PatternsArgs {
    #[command(subcommand)]
    action: PatternsAction,
}

#[derive(Subcommand, Debug)]
enum PatternsAction {
    /// Merge patterns sharing (supplier, layout hash) whose anchors fall within 50pt of one another.
    Consolidate,
    /// Remove patterns unused for longer than the configured max age, or that never accumulated real usage.
    Cleanup,
}

#[derive(clap::Args, Debug)]
struct CalibrateArgs {
    #[command(subcommand)]
    action: CalibrateAction,
}

#[derive(Subcommand, Debug)]
enum CalibrateAction {
    /// Fit an isotonic model from a ground-truth file of `raw_score,correct` lines.
    Train {
        ground_truth: PathBuf,
        /// Where to write the serialized model (spec §4.8: "persisted as a serialized artifact").
        #[arg(long, default_value = "calibration-model.json")]
        output: PathBuf,
    },
    /// Bin a ground-truth file into 10 equal-frequency quantiles and report ECE/MCE.
    Validate { ground_truth: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;

    let exit_code = match cli.command {
        Commands::Run(args) => run_command(&args, &config, cli.quiet)?,
        Commands::ImportCorrections(args) => import_corrections_command(&args, &config)?,
        Commands::Patterns(args) => patterns_command(&args, &config)?,
        Commands::Calibrate(args) => calibrate_command(&args)?,
    };

    std::process::exit(exit_code)
}

/// Enumerates PDF files under `input`: the path itself if it is a file, or
/// every `.pdf`-extensioned entry directly inside it in lexicographic order
/// if it is a directory (spec §6 Inputs).
fn collect_input_paths(input: &Path) -> Result<Vec<String>> {
    if input.is_file() {
        return Ok(vec![input.to_string_lossy().to_string()]);
    }
    if !input.is_dir() {
        bail!("input path does not exist: {}", input.display());
    }

    let mut paths: Vec<String> = fs::read_dir(input)
        .with_context(|| format!("failed to read directory: {}", input.display()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf")))
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    paths.sort();
    Ok(paths)
}

fn build_context(config: &Config, strict_override: bool, ai_disabled: bool) -> PipelineContext {
    let mut ctx = PipelineContext::new(config.pipeline_config(strict_override));

    if let Some(model_path) = &config.calibration_model_path {
        match fs::read_to_string(model_path).ok().and_then(|s| IsotonicModel::from_json(&s).ok()) {
            Some(model) => ctx = ctx.with_calibration(Arc::new(model)),
            None => eprintln!("{} calibration model not found or unreadable at {}, using raw scores", "warning:".yellow().bold(), model_path.display()),
        }
    }

    match PatternStore::open(&config.pattern_store_path) {
        Ok(store) => ctx = ctx.with_pattern_store(Arc::new(store)),
        Err(e) => eprintln!(
            "{} pattern store unavailable at {}, continuing without pattern boosts: {e}",
            "warning:".yellow().bold(),
            config.pattern_store_path.display()
        ),
    }

    if config.ai_enabled && !ai_disabled {
        if let Some(api_key) = config.ai_api_key.clone() {
            let client = match &config.ai_endpoint {
                Some(endpoint) => OpenAiLikeClient::with_endpoint(api_key, config.ai_model.clone(), endpoint.clone()),
                None => OpenAiLikeClient::new(api_key, config.ai_model.clone()),
            };
            ctx = ctx.with_ai_provider(Arc::new(client));
        } else {
            eprintln!("{} AI is enabled but no API key is configured; continuing heuristic-only", "warning:".yellow().bold());
        }
    }

    ctx
}

fn run_command(args: &RunArgs, config: &Config, quiet: bool) -> Result<i32> {
    let paths = collect_input_paths(&args.input)?;
    if paths.is_empty() {
        println!("{} no PDF files found under {}", "warning:".yellow().bold(), args.input.display());
    }

    let ctx = build_context(config, args.strict, args.no_ai);

    let progress = if quiet || paths.len() < 2 {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(paths.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let results = run_batch(&paths, &ctx, args.strict);

    let mut builder = ReportBuilder::new();
    let mut export_rows: Vec<ExportRow> = Vec::new();
    let mut review_finalized: Vec<FinalizedInvoice> = Vec::new();
    for result in results {
        progress.inc(1);
        if let Some(error) = result.error {
            builder.push_error(error);
        }
        export_rows.extend(rows_for_file(&result.invoices));
        let mut invoices = result.invoices;
        invoices.sort_by_key(|f| f.invoice.page_start);
        review_finalized.extend(invoices.iter().filter(|f| f.invoice.status == Status::Review).cloned());
        builder.push_file(&result.file_path, invoices);
    }
    progress.finish_and_clear();

    let report = builder.build();
    write_report(&report, &args.report, args.yaml)?;
    if !args.export.as_os_str().is_empty() {
        write_export(&export_rows, &args.export)?;
    }
    if !report.errors.is_empty() {
        fs::write(&args.errors, serde_json::to_string_pretty(&report.errors)?)
            .with_context(|| format!("failed to write errors sidecar to {}", args.errors.display()))?;
    }
    if !args.review_dir.as_os_str().is_empty() {
        for (finalized, validation) in review_finalized.iter().zip(report.validation_queue.iter()) {
            if let Err(e) = write_review_package(&args.review_dir, finalized, validation, &report) {
                eprintln!("{} failed to write review package for {}: {e}", "warning:".yellow().bold(), validation.invoice_id);
            }
        }
    }

    print_summary(&report, quiet);

    let strict_abort = args.strict && !report.errors.is_empty();
    Ok(i32::from(strict_abort))
}

fn write_report(report: &faktura_core::RunReport, path: &Path, yaml: bool) -> Result<()> {
    let serialized = if yaml { YamlSerializer.serialize_report(report)? } else { JsonSerializer::new().serialize_report(report)? };
    fs::write(path, serialized).with_context(|| format!("failed to write run report to {}", path.display()))
}

/// Renders a serde-tagged enum (snake_case/UPPERCASE per its own `#[serde(rename_all)]`)
/// to its wire string, rather than its `Debug` spelling, so the export's
/// `status`/`extraction_source` columns match the run report's JSON.
fn enum_label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

fn write_export(rows: &[ExportRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("failed to open export file {}", path.display()))?;
    writer.write_record([
        "source_path",
        "invoice_number",
        "supplier",
        "date",
        "reference",
        "line_number",
        "description",
        "line_total",
        "invoice_number_confidence",
        "total_amount_confidence",
        "status",
        "lines_sum",
        "diff",
        "extraction_source",
    ])?;
    for row in rows {
        writer.write_record([
            row.source_path.as_str(),
            row.invoice_number.as_deref().unwrap_or(""),
            row.supplier.as_deref().unwrap_or(""),
            row.date.as_deref().unwrap_or(""),
            row.reference.as_deref().unwrap_or(""),
            &row.line_number.to_string(),
            row.description.as_str(),
            &row.line_total.map_or_else(String::new, |v| v.to_string()),
            &row.invoice_number_confidence.to_string(),
            &row.total_amount_confidence.to_string(),
            &enum_label(&row.status),
            &row.lines_sum.to_string(),
            &row.diff.map_or_else(String::new, |v| v.to_string()),
            &enum_label(&row.extraction_source),
        ])?;
    }
    writer.flush().with_context(|| format!("failed to flush export file {}", path.display()))
}

fn print_summary(report: &faktura_core::RunReport, quiet: bool) {
    if quiet {
        return;
    }
    let counts = report.status_counts();
    println!(
        "{} {} invoices across {} files: {} ok, {} partial, {} review, {} failed",
        "done:".green().bold(),
        report.total_invoices(),
        report.files.len(),
        counts.ok.to_string().green(),
        counts.partial.to_string().yellow(),
        counts.review.to_string().yellow().bold(),
        counts.failed.to_string().red(),
    );
    if !report.errors.is_empty() {
        println!("{} {} files failed fatally; see the errors sidecar", "warning:".yellow().bold(), report.errors.len());
    }
}

fn import_corrections_command(args: &ImportCorrectionsArgs, config: &Config) -> Result<i32> {
    let store = PatternStore::open(&config.pattern_store_path)
        .with_context(|| format!("failed to open pattern store at {}", config.pattern_store_path.display()))?;

    let content = fs::read_to_string(&args.input).with_context(|| format!("failed to read corrections file {}", args.input.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let correction: Correction = match serde_json::from_str(line) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{} line {}: malformed correction, skipping: {e}", "warning:".yellow().bold(), line_number + 1);
                skipped += 1;
                continue;
            }
        };
        let invoice_id = format!("{}:{}", correction.supplier_name, correction.layout_hash);
        match store.insert_correction(&correction, &invoice_id) {
            Ok(true) => {
                imported += 1;
                let pattern = pattern_from_correction(&correction, correction.recorded_at);
                if let Err(e) = store.upsert_pattern(&pattern) {
                    eprintln!("{} line {}: correction stored but pattern derivation failed: {e}", "warning:".yellow().bold(), line_number + 1);
                }
            }
            Ok(false) => skipped += 1,
            Err(e) => eprintln!("{} line {}: failed to insert correction: {e}", "warning:".yellow().bold(), line_number + 1),
        }
    }

    println!("{} imported {imported} corrections, skipped {skipped} duplicate/invalid", "done:".green().bold());
    Ok(0)
}

fn patterns_command(args: &PatternsArgs, config: &Config) -> Result<i32> {
    let store = PatternStore::open(&config.pattern_store_path)
        .with_context(|| format!("failed to open pattern store at {}", config.pattern_store_path.display()))?;

    match args.action {
        PatternsAction::Consolidate => {
            let removed = faktura_learn::consolidate(&store)?;
            println!("{} consolidated {removed} patterns", "done:".green().bold());
        }
        PatternsAction::Cleanup => {
            let removed = faktura_learn::cleanup(&store, chrono::Utc::now(), config.pattern_store_max_age_days)?;
            println!("{} removed {removed} stale patterns", "done:".green().bold());
        }
    }
    Ok(0)
}

fn calibrate_command(args: &CalibrateArgs) -> Result<i32> {
    match &args.action {
        CalibrateAction::Train { ground_truth, output } => {
            let samples = read_ground_truth(ground_truth)?;
            let weighted = aggregate_weighted_samples(&samples);
            let model = IsotonicModel::train(&weighted);
            let json = model.to_json().context("failed to serialize calibration model")?;
            fs::write(output, json).with_context(|| format!("failed to write calibration model to {}", output.display()))?;
            println!("{} trained calibration model from {} samples, wrote {}", "done:".green().bold(), samples.len(), output.display());
            Ok(0)
        }
        CalibrateAction::Validate { ground_truth } => {
            let samples = read_ground_truth(ground_truth)?;
            let report = validate(&samples);
            println!(
                "ECE={:.4} MCE={:.4} samples={} recalibration_recommended={}",
                report.ece, report.mce, report.total_samples, report.recalibration_recommended
            );
            Ok(i32::from(report.recalibration_recommended))
        }
    }
}

/// Parses a ground-truth file of `raw_confidence,actual_correct` lines
/// (spec §4.8: "a ground-truth file (line-delimited (raw_confidence,
/// actual_correct))").
fn read_ground_truth(path: &Path) -> Result<Vec<GroundTruthSample>> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read ground-truth file {}", path.display()))?;
    let mut samples = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ',');
        let raw = parts.next().unwrap_or_default().trim();
        let correct = parts.next().unwrap_or_default().trim();
        let raw_confidence: f64 = raw.parse().with_context(|| format!("line {}: invalid raw_confidence {raw:?}", line_number + 1))?;
        let actual_correct = matches!(correct, "1" | "true" | "TRUE" | "True");
        samples.push(GroundTruthSample { raw_confidence, actual_correct });
    }
    Ok(samples)
}

/// Groups identical `(raw_score, correct)` pairs into weighted samples
/// (spec §4.8: "pass per-score sample counts as weights to the isotonic
/// fit").
fn aggregate_weighted_samples(samples: &[GroundTruthSample]) -> Vec<WeightedSample> {
    use std::collections::HashMap;
    let mut counts: HashMap<(u64, bool), u64> = HashMap::new();
    for sample in samples {
        let key = (sample.raw_confidence.to_bits(), sample.actual_correct);
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((bits, correct), weight)| WeightedSample {
            raw_score: f64::from_bits(bits),
            correct: f64::from(correct),
            weight: weight as f64,
        })
        .collect()
}
