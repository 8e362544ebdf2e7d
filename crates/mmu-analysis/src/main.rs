use anyhow::{Context, Result};
use clap::Parser;
use mmu::{mutator_utilization, MmuCurve, DEFAULT_MAX_BANDS};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

mod event_table;
mod report;
use event_table::EventDecoder;

#[derive(Parser)]
#[command(name = "mmu-analysis")]
#[command(about = "Compute minimum mutator utilization from GC trace events")]
struct Cli {
    #[arg(short = 'f', long, help = "Input Parquet event table")]
    filename: PathBuf,

    #[arg(
        short = 'w',
        long = "window",
        help = "Window size in nanoseconds (repeatable)"
    )]
    windows: Vec<i64>,

    #[arg(
        long,
        default_value_t = 20,
        help = "Number of log-spaced windows when none are given"
    )]
    points: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_BANDS, help = "Maximum number of bands in the index")]
    max_bands: usize,

    #[arg(
        long,
        help = "Output file prefix (defaults to base name of input file)"
    )]
    output_prefix: Option<String>,

    /// Verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Open the input Parquet file
    let file = File::open(&cli.filename)
        .with_context(|| format!("Failed to open input file: {}", cli.filename.display()))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| "Failed to create Parquet reader builder")?;

    let mut decoder = EventDecoder::new();
    decoder.process_parquet_file(builder)?;
    let events = decoder.into_events();
    if events.is_empty() {
        return Err(anyhow::anyhow!(
            "No events found in {}",
            cli.filename.display()
        ));
    }

    let util = mutator_utilization(&events);
    let curve = MmuCurve::with_max_bands(util, cli.max_bands)
        .with_context(|| "Failed to build MMU curve")?;

    log::info!(
        "{} events, {} utilization points, span {}ns, mean utilization {:.4}",
        events.len(),
        curve.utilization().len(),
        curve.span(),
        curve.mean_utilization()
    );

    let windows = if cli.windows.is_empty() {
        report::log_spaced_windows(curve.span(), cli.points)
    } else {
        cli.windows.clone()
    };
    let rows = curve.mmu_curve(&windows);

    print!("{}", report::format_table(&rows));

    let output_filename = determine_output_filename(&cli.filename, cli.output_prefix.as_deref())?;
    let output_file = File::create(&output_filename).with_context(|| {
        format!(
            "Failed to create output file: {}",
            output_filename.display()
        )
    })?;
    report::write_report(output_file, &rows)?;

    println!("Analysis complete! Results written to {}", output_filename.display());

    Ok(())
}

fn determine_output_filename(input_path: &Path, output_prefix: Option<&str>) -> Result<PathBuf> {
    let base_name = input_path
        .file_stem()
        .ok_or_else(|| anyhow::anyhow!("Invalid input filename"))?
        .to_string_lossy();

    let prefix = output_prefix.unwrap_or(&base_name);
    let output_filename = format!("{}_mmu.parquet", prefix);

    if let Some(parent) = input_path.parent() {
        Ok(parent.join(output_filename))
    } else {
        Ok(PathBuf::from(output_filename))
    }
}
