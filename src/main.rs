use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use wisecondor::config::{BuildConfig, ScoreConfig};
use wisecondor::marking::{mark_and_score, OUTLIER_THRESHOLD};
use wisecondor::sample_reader::{self, ReadOptions};
use wisecondor::types::{ReferenceTable, ScoredSample};
use wisecondor::{output, reference, reference_io};

#[derive(Parser)]
#[command(name = "wisecondor")]
#[command(version)]
#[command(about = "Detect copy number aberrations by within-sample comparison of binned read depth", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Number of threads for parallel processing
    #[arg(long, global = true, default_value_t = num_cpus())]
    threads: usize,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build a reference table from a directory of reference samples
    BuildReference(BuildArgs),
    /// Score a sample against a reference table
    Score(ScoreArgs),
}

#[derive(ClapArgs)]
struct InputArgs {
    /// Samples are female (do not double X and Y values)
    #[arg(long)]
    female: bool,

    /// Zero-based column holding the corrected read depth
    #[arg(long, default_value = "8")]
    value_column: usize,
}

impl InputArgs {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            value_column: self.value_column,
            female: self.female,
        }
    }
}

#[derive(ClapArgs)]
struct BuildArgs {
    /// Directory containing reference samples (.correct)
    refdir: PathBuf,

    /// Reference table output (JSON)
    output: PathBuf,

    #[command(flatten)]
    input: InputArgs,

    /// Ignore the x largest per-sample differences in each distance; use when
    /// up to x reference samples may share an aberration
    #[arg(long, default_value = "0")]
    ignore: usize,

    /// Reference bins kept per target bin before removing neighbouring bins
    #[arg(long, default_value = "250")]
    max_candidates_initial: usize,

    /// Reference bins kept per target bin after removing neighbouring bins
    #[arg(long, default_value = "100")]
    max_candidates_final: usize,

    /// Starting cutoff for selecting good reference bins
    #[arg(long, default_value = "1000000")]
    cutoff_seed: f64,

    /// Rounds of cutoff refinement
    #[arg(long, default_value = "3")]
    cutoff_rounds: usize,
}

#[derive(ClapArgs)]
struct ScoreArgs {
    /// Sample to be tested (.correct)
    sample: PathBuf,

    /// Reference table built with build-reference
    reference: PathBuf,

    /// Output file: the sample rows with Z_score and sw_Z_score columns
    output: PathBuf,

    #[command(flatten)]
    input: InputArgs,

    /// Maximum number of marking rounds
    #[arg(long, default_value = "5")]
    max_rounds: usize,

    /// Minimum reference bins; target bins with fewer are not scored
    #[arg(long, default_value = "10")]
    min_ref_bins: usize,

    /// Maximum reference bins per target bin
    #[arg(long, default_value = "100")]
    max_ref_bins: usize,

    /// Bins on each side of a target bin used for smoothing (3 uses 3+1+3 bins)
    #[arg(long, default_value = "5")]
    window: usize,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn make_progress_bar(quiet: bool, len: u64) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  [{elapsed_precise}/{eta_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

fn make_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()?;

    match &cli.command {
        Command::BuildReference(args) => run_build(args, cli.threads, cli.quiet),
        Command::Score(args) => run_score(args, cli.threads, cli.quiet),
    }
}

fn run_build(args: &BuildArgs, threads: usize, quiet: bool) -> Result<()> {
    let config = BuildConfig {
        max_candidates_initial: args.max_candidates_initial,
        max_candidates_final: args.max_candidates_final,
        ignore_top_k: args.ignore,
        cutoff_seed: args.cutoff_seed,
        cutoff_rounds: args.cutoff_rounds,
    };
    config.validate()?;

    // Validate inputs
    if !args.refdir.is_dir() {
        anyhow::bail!("Reference directory not found: {}", args.refdir.display());
    }

    progress!(quiet, "Reference Table Builder");
    progress!(quiet, "=========================================");
    progress!(quiet, "Reference samples: {}", args.refdir.display());
    progress!(quiet, "Output: {}", args.output.display());
    progress!(quiet, "Female: {}", args.input.female);
    progress!(quiet, "Ignore largest differences: {}", config.ignore_top_k);
    progress!(quiet, "Max candidates (initial/final): {}/{}", config.max_candidates_initial, config.max_candidates_final);
    progress!(quiet, "Cutoff seed: {}", config.cutoff_seed);
    progress!(quiet, "Cutoff rounds: {}", config.cutoff_rounds);
    progress!(quiet, "Threads: {}", threads);
    progress!(quiet);

    progress!(quiet, "Step 1: Loading reference samples...");
    let loaded = sample_reader::load_population(&args.refdir, &args.input.read_options())?;
    for (path, err) in &loaded.skipped {
        eprintln!("  Warning: skipping {}: {:#}", path.display(), err);
    }
    progress!(quiet, "  Loaded {} samples ({} skipped)", loaded.samples.len(), loaded.skipped.len());
    config.validate_population(loaded.samples.len())?;

    progress!(quiet);
    progress!(quiet, "Step 2: Ranking reference bins...");
    let pb = make_progress_bar(quiet, reference::count_targets(&loaded.samples));
    let candidates = reference::build_candidate_table(&loaded.samples, &config, Some(&pb))?;
    pb.finish_and_clear();
    progress!(quiet, "  Candidates kept: {}", candidates.total_candidates());

    progress!(quiet, "Step 3: Calibrating reference cutoff ({} rounds)...", config.cutoff_rounds);
    let cutoff = reference::calibrate_cutoff(&candidates, config.cutoff_seed, config.cutoff_rounds)?;
    progress!(quiet, "  Cutoff: {:.6}", cutoff);

    progress!(quiet, "Step 4: Removing reference bins above cutoff...");
    let lookup = reference::prune_by_cutoff(&candidates, cutoff);
    let kept = lookup.total_candidates();
    progress!(quiet, "  Removed {} of {} candidates", candidates.total_candidates() - kept, candidates.total_candidates());

    progress!(quiet, "Step 5: Writing reference table...");
    reference_io::save_reference(&ReferenceTable { cutoff, lookup }, &args.output)?;

    progress!(quiet);
    progress!(quiet, "Done! Reference written to: {}", args.output.display());
    Ok(())
}

fn run_score(args: &ScoreArgs, threads: usize, quiet: bool) -> Result<()> {
    let config = ScoreConfig {
        max_rounds: args.max_rounds,
        min_ref_bins: args.min_ref_bins,
        max_ref_bins: args.max_ref_bins,
        smoothing_window: args.window,
    };
    config.validate()?;

    // Validate inputs
    for path in [&args.sample, &args.reference] {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
    }

    progress!(quiet, "Sample Scoring");
    progress!(quiet, "=========================================");
    progress!(quiet, "Sample: {}", args.sample.display());
    progress!(quiet, "Reference: {}", args.reference.display());
    progress!(quiet, "Output: {}", args.output.display());
    progress!(quiet, "Female: {}", args.input.female);
    progress!(quiet, "Max rounds: {}", config.max_rounds);
    progress!(quiet, "Reference bins (min/max): {}/{}", config.min_ref_bins, config.max_ref_bins);
    progress!(quiet, "Window: {}", config.smoothing_window);
    progress!(quiet, "Threads: {}", threads);
    progress!(quiet);

    progress!(quiet, "Step 1: Loading sample and reference table...");
    let sample = sample_reader::load_sample(&args.sample, &args.input.read_options())?;
    let reference = reference_io::load_reference(&args.reference)?;
    progress!(quiet, "  Bins: {}", sample.total_bins());
    progress!(quiet, "  Reference cutoff: {:.6}", reference.cutoff);

    progress!(quiet);
    progress!(quiet, "Step 2: Marking aberrant bins...");
    let spinner = make_spinner(quiet);
    let scored = mark_and_score(&sample, &reference, &config, Some(&spinner))?;
    spinner.finish_and_clear();
    progress!(quiet, "  Stopped after {} rounds, {} bins marked", scored.rounds, scored.marked);

    progress!(quiet, "Step 3: Summary statistics...");
    report_summary(&scored, quiet);

    progress!(quiet);
    progress!(quiet, "Step 4: Writing results...");
    output::write_report(&args.sample, &scored, &args.output)?;

    progress!(quiet);
    progress!(quiet, "Done! Results written to: {}", args.output.display());
    Ok(())
}

fn report_summary(scored: &ScoredSample, quiet: bool) {
    // Collect scored bins
    let mut z_values: Vec<f64> = scored.raw.iter().flatten().flatten().copied().collect();
    let missing = scored.raw.iter().map(Vec::len).sum::<usize>() - z_values.len();

    progress!(quiet, "  Scored bins: {}", z_values.len());
    progress!(quiet, "  Unscored bins: {}", missing);
    if z_values.is_empty() {
        return;
    }

    z_values.sort_by(|a, b| a.total_cmp(b));
    let percentile = |p: f64| -> f64 {
        let idx = (p * z_values.len() as f64) as usize;
        z_values[idx.min(z_values.len() - 1)]
    };
    let extreme = z_values.iter().filter(|z| z.abs() >= OUTLIER_THRESHOLD).count();

    progress!(quiet, "  |Z| >= {}: {}", OUTLIER_THRESHOLD, extreme);
    progress!(quiet, "  Min Z: {:.3}", z_values[0]);
    progress!(quiet, "  1st percentile: {:.3}", percentile(0.01));
    progress!(quiet, "  Median Z: {:.3}", percentile(0.50));
    progress!(quiet, "  99th percentile: {:.3}", percentile(0.99));
    progress!(quiet, "  Max Z: {:.3}", z_values[z_values.len() - 1]);
}
