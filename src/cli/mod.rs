//! Kolosal Online CLI Module
//!
//! Command-line interface for online training runs, hyper-parameter search
//! and dataset inspection.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::optimizer::{SamplerType, SearchConfig, SearchRunner};
use crate::streaming::{run_from_config, LossPoint, LossReporter, StopReason, StreamConfig, WarmupConfig};
use crate::training::{ModelFamily, Scoring};
use crate::utils::LabeledTable;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-online")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Online learning on chunked CSV streams, with hyper-parameter search")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train incrementally over a CSV stream and report windowed log-loss
    Stream {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// JSON run configuration; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rows per batch
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Batches per loss report (K)
        #[arg(short = 'k', long)]
        window: Option<usize>,

        /// Hash width
        #[arg(long)]
        n_features: Option<usize>,

        /// Process the whole file instead of stopping at the cap
        #[arg(long)]
        full_run: bool,

        /// Batches processed when not running in full (default 2 * K)
        #[arg(long)]
        max_batches: Option<u64>,

        /// Seed of the warm-up split
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the warm-up fit on the file prefix
        #[arg(long)]
        no_warmup: bool,

        /// Write the run summary as JSON
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Random or TPE hyper-parameter search with cross-validation
    Search {
        /// Input CSV file with numeric features
        #[arg(short, long)]
        data: PathBuf,

        /// JSON search configuration; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,

        /// Number of trials
        #[arg(long)]
        evals: Option<usize>,

        /// Cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Search strategy (random, tpe)
        #[arg(long)]
        strategy: Option<String>,

        /// Model family (rf, gb)
        #[arg(short, long)]
        family: Option<String>,

        /// Scoring (neg_log_loss, accuracy)
        #[arg(long)]
        scoring: Option<String>,

        /// Worker threads, 0 for all cores
        #[arg(long)]
        n_jobs: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Directory the study JSON is written to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Prints each window loss as it is flushed
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    window_size: usize,
}

impl ConsoleReporter {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }
}

impl LossReporter for ConsoleReporter {
    fn report(&mut self, point: &LossPoint) {
        let window = point.batch_index / self.window_size.max(1) as u64;
        println!(
            "  {} {:<8} {} {:<8} {} {}",
            accent("›"),
            format!("#{}", window + 1),
            muted("batch"),
            point.batch_index,
            muted("log-loss"),
            format!("{:.5}", point.loss).white().bold()
        );
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_stream(
    data_path: &Path,
    config_path: Option<&Path>,
    chunk_size: Option<usize>,
    window: Option<usize>,
    n_features: Option<usize>,
    full_run: bool,
    max_batches: Option<u64>,
    seed: Option<u64>,
    no_warmup: bool,
    summary_out: Option<&Path>,
) -> anyhow::Result<()> {
    section("Stream");

    let mut config = match config_path {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };
    if let Some(n) = chunk_size {
        config.chunk_size = n;
    }
    if let Some(k) = window {
        config.window_size = k;
    }
    if let Some(n) = n_features {
        config.n_features = n;
    }
    if full_run {
        config.full_run = true;
    }
    if let Some(n) = max_batches {
        config.max_batches = Some(n);
    }
    if no_warmup {
        config.warmup = None;
    } else if let Some(seed) = seed {
        config.warmup.get_or_insert_with(WarmupConfig::default).seed = seed;
    }
    config.validate()?;

    let cap = match config.batch_cap() {
        Some(n) => format!("{} batches", n),
        None => "full run".to_string(),
    };
    println!("  {:<16} {}", muted("File"), data_path.display());
    println!("  {:<16} {}", muted("Chunk size"), config.chunk_size);
    println!("  {:<16} {}", muted("Window (K)"), config.window_size);
    println!("  {:<16} {}", muted("Hash width"), config.n_features);
    println!("  {:<16} {}", muted("Stop after"), cap);
    println!();

    let mut reporter = ConsoleReporter::new(config.window_size);
    let report = run_from_config(data_path, &config, &mut reporter)?;
    let summary = &report.summary;

    if let Some(metrics) = &report.warmup {
        section("Warm-up");
        println!("  {:<16} {:.4}", muted("Baseline"), metrics.baseline);
        println!("  {:<16} {:.4}", muted("Accuracy"), metrics.accuracy);
        println!("  {:<16} {:.4}", muted("F1"), metrics.f1_score);
        println!("  {:<16} {:.4}", muted("Log-loss"), metrics.log_loss);
        println!("  {:<16} {}", muted("Validated on"), metrics.n_samples);
    }

    section("Summary");
    let stop = match summary.stop_reason {
        StopReason::Exhausted => "source exhausted",
        StopReason::CapReached => "cap reached",
    };
    println!("  {:<16} {}", muted("Batches"), summary.batches_processed);
    println!("  {:<16} {}", muted("Rows"), summary.rows_processed);
    println!("  {:<16} {}", muted("Reports"), summary.loss_series.len());
    println!("  {:<16} {}", muted("Stopped"), stop);
    println!("  {:<16} {:.2}s ({:.0} rows/s)", muted("Time"), summary.elapsed_secs, summary.throughput);
    if let Some(last) = summary.loss_series.last() {
        println!("  {:<16} {}", muted("Last log-loss"), format!("{:.5}", last.loss).white().bold());
    }

    if let Some(path) = summary_out {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!();
        step_ok(&format!("Summary saved → {}", path.display()));
    }

    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_search(
    data_path: &Path,
    config_path: Option<&Path>,
    target: Option<&str>,
    evals: Option<usize>,
    folds: Option<usize>,
    strategy: Option<&str>,
    family: Option<&str>,
    scoring: Option<&str>,
    n_jobs: Option<usize>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Search");

    let mut config = match config_path {
        Some(path) => SearchConfig::from_file(path)?,
        None => SearchConfig::default(),
    };
    if let Some(target) = target {
        config.target_column = target.to_string();
    }
    if let Some(n) = evals {
        config.evals = n;
    }
    if let Some(n) = folds {
        config.folds = n;
    }
    if let Some(s) = strategy {
        config.strategy = s.parse::<SamplerType>()?;
    }
    if let Some(f) = family {
        config.family = f.parse::<ModelFamily>()?;
        if config_path.is_none() {
            config.hp_dist = SearchConfig::default_space(config.family);
        }
    }
    if let Some(s) = scoring {
        config.scoring = s.parse::<Scoring>()?;
    }
    if let Some(n) = n_jobs {
        config.n_jobs = n;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(dir) = output {
        config.output_dir = dir.to_path_buf();
    }

    step_run("Loading data");
    let start = Instant::now();
    let table = LabeledTable::load_csv(data_path, &config.target_column)?;
    step_done(&format!(
        "{} rows × {} features, {} classes in {:?}",
        table.n_samples(),
        table.feature_names.len(),
        table.n_classes(),
        start.elapsed()
    ));

    let runner = SearchRunner::new(config)?;
    let config = runner.config();

    step_run(&format!(
        "Running {} {} trials on {}",
        config.evals,
        config.strategy.name().cyan(),
        config.family.to_string().cyan()
    ));
    let start = Instant::now();
    let study = runner.run(&table)?;
    step_done(&format!("{:?}", start.elapsed()));

    let path = config.study_path(&table.name);
    study.save(&path)?;
    step_ok(&format!("Study saved → {}", path.display()));

    section("Top trials");
    for line in study.report(config.top_n).lines() {
        println!("  {}", line);
    }

    if let Some(best) = study.best_trial() {
        println!("  {} trial {} {} {:.4}",
            ok("best"),
            best.trial_id.to_string().white().bold(),
            muted(&format!("{}:", config.scoring.name())),
            best.mean_score
        );
    }
    if let Some(params) = study.best_params() {
        let pairs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  {} {}", muted("params:"), pairs.join(" "));
    }

    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(data_path.to_path_buf()))?
        .finish()?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);
    println!();

    println!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(40)));

    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
        );
    }

    println!();
    Ok(())
}

pub fn print_banner() {
    println!();
    line_box_top();
    line_box(&format!("{}", "Kolosal Online".white().bold()));
    line_box(&kv("version", &format!("v{}", env!("CARGO_PKG_VERSION"))));
    line_box_bottom();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let styled = format!("{}", "abc".truecolor(1, 2, 3));
        assert_eq!(strip_ansi(&styled), "abc");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_parse_stream_flags() {
        let cli = Cli::try_parse_from([
            "kolosal-online", "stream", "-d", "train.csv", "--chunk-size", "50", "-k", "4", "--no-warmup",
        ])
        .unwrap();
        match cli.command {
            Commands::Stream { data, chunk_size, window, no_warmup, full_run, .. } => {
                assert_eq!(data, PathBuf::from("train.csv"));
                assert_eq!(chunk_size, Some(50));
                assert_eq!(window, Some(4));
                assert!(no_warmup);
                assert!(!full_run);
            }
            _ => panic!("expected the stream command"),
        }
    }

    #[test]
    fn test_parse_search_flags() {
        let cli = Cli::try_parse_from([
            "kolosal-online", "search", "-d", "iris.csv", "--strategy", "tpe", "-f", "gb", "--evals", "8",
        ])
        .unwrap();
        match cli.command {
            Commands::Search { strategy, family, evals, .. } => {
                assert_eq!(strategy.as_deref(), Some("tpe"));
                assert_eq!(family.as_deref(), Some("gb"));
                assert_eq!(evals, Some(8));
            }
            _ => panic!("expected the search command"),
        }
    }
}
