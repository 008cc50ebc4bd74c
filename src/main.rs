use std::path::PathBuf;

use anyhow::{Context, Result};
use cache_set_analyzer::{
    AnalysisConfig, Collector, ResultMatrix,
    report::{self, TimelineSummary},
    stream_vcd_signals,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compare cache set usage and hit/miss statistics across cache
/// configurations.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory containing one sub-directory per cache configuration
    results_dir: PathBuf,

    /// TOML configuration file (built-in defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for the Markdown report
    #[arg(short, long, default_value = "cache_analysis_report")]
    output: PathBuf,

    /// Number of parallel workers (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Report progress for every test/configuration pair
    #[arg(long)]
    verbose: bool,

    /// Print per-set heatmaps and comparison tables to stdout
    #[arg(long)]
    heatmap: bool,

    /// VCD file whose signal timeline is added to the report
    #[arg(long)]
    timeline_vcd: Option<PathBuf>,

    /// Signal name to extract from the timeline VCD
    #[arg(long, default_value = "hit")]
    signal: String,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(args)
}

fn run(args: Args) -> Result<()> {
    let mut config = AnalysisConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.jobs.is_some() {
        config.jobs = args.jobs;
    }

    let collector = Collector::new(&args.results_dir, &config).verbose(args.verbose);
    let matrix = collector
        .collect(&config.tests, &config.configs)
        .with_context(|| format!("Unable to analyze {}", args.results_dir.display()))?;

    if args.heatmap {
        print_sets(&matrix);
    }

    let timeline = match &args.timeline_vcd {
        Some(path) => {
            let stream = stream_vcd_signals(path, &args.signal)
                .with_context(|| format!("Unable to open {}", path.display()))?;
            // the reader has already logged a warning
            if stream.is_missing() {
                Some(TimelineSummary::missing(&args.signal))
            } else {
                Some(TimelineSummary::from_events(&args.signal, stream))
            }
        }
        None => None,
    };

    let report_path = report::write_report(&matrix, &args.output, timeline.as_ref())
        .with_context(|| format!("Unable to write report into {}", args.output.display()))?;
    info!("report written to {}", report_path.display());
    println!("Analysis report generated in {}", args.output.display());
    Ok(())
}

fn print_sets(matrix: &ResultMatrix) {
    for test in matrix.tests() {
        println!("\n== {test} ==");
        print!("{}", report::render_set_report(matrix, test));
    }
}
