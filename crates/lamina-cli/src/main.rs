//! Command-line front end for the lamina slicer.
//!
//! Composes a height-parameterized slicing template from the given module
//! references and drives the configured renderer once per height, in
//! parallel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Parser};
use lamina::{format_height, slice, SliceConfig, Spacing};
use log::LevelFilter;

/// Slice a 3D solid model into stacked 2D cross-section files.
#[derive(Parser, Debug)]
#[command(name = "lamina", version, about)]
#[command(group(ArgGroup::new("spacing").required(true).args(["step", "count"])))]
struct Cli {
    /// Module contributing solid geometry to the sliced object (repeatable)
    #[arg(long = "object-module", value_name = "MODULE", required = true)]
    object_modules: Vec<String>,

    /// Module subtracted from the object, e.g. an alignment key (repeatable)
    #[arg(long = "key-module", value_name = "MODULE")]
    key_modules: Vec<String>,

    /// File imported into the generated template (repeatable)
    #[arg(short, long = "include", value_name = "FILE")]
    includes: Vec<String>,

    /// Height of the first slice, in mm
    #[arg(long, default_value_t = 0.0, value_name = "MM")]
    start: f64,

    /// Height of the last slice, in mm
    #[arg(long, default_value_t = 100.0, value_name = "MM")]
    end: f64,

    /// Distance between consecutive slices, in mm
    #[arg(short, long, value_name = "MM")]
    step: Option<f64>,

    /// Approximate number of slices to make
    #[arg(short = 'n', long, value_name = "N")]
    count: Option<usize>,

    /// Output path pattern; must contain {height} and end in the output format
    #[arg(
        short,
        long,
        default_value = "out/slice_{height}.dxf",
        value_name = "PATTERN"
    )]
    output: String,

    /// File extension the renderer emits
    #[arg(long, default_value = "dxf", value_name = "EXT")]
    format: String,

    /// Renderer command to invoke
    #[arg(long, default_value = "openscad", value_name = "CMD")]
    renderer: String,

    /// Number of renderer processes to run in parallel
    #[arg(short, long, default_value_t = 4, value_name = "N")]
    jobs: usize,

    /// Per-slice render timeout in seconds; unlimited when omitted
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write the template to this path instead of a unique temporary file
    #[arg(long, value_name = "PATH")]
    template_file: Option<PathBuf>,

    /// Keep the generated template file after the run
    #[arg(short, long)]
    keep_template: bool,

    /// Exit with an error if any slice fails
    #[arg(long)]
    fail_on_error: bool,

    /// Log verbosity (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .format_timestamp(None)
        .init();

    let spacing = Spacing::from_options(cli.step, cli.count)?;
    let config = SliceConfig {
        object_modules: cli.object_modules,
        key_modules: cli.key_modules,
        includes: cli.includes,
        start: cli.start,
        end: cli.end,
        spacing,
        output_pattern: cli.output,
        output_format: cli.format,
        renderer_command: cli.renderer,
        jobs: cli.jobs,
        job_timeout: cli.timeout.map(Duration::from_secs),
        template_path: cli.template_file,
        keep_template: cli.keep_template,
        fail_on_error: cli.fail_on_error,
        ..Default::default()
    };

    let summary = slice(config)?;

    println!();
    println!("Slicing complete!");
    println!(
        "  Slices: {} ok, {} failed of {}",
        summary.succeeded(),
        summary.failed(),
        summary.total()
    );
    if summary.cancelled() > 0 {
        println!("  Cancelled: {}", summary.cancelled());
    }
    if summary.failed() > 0 {
        println!("  Failed heights:");
        for result in summary.failures() {
            println!(
                "    z={}: {}",
                format_height(result.height),
                result.outcome.diagnostic().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}
