//! packdef - Convert packed C struct headers to YAML packet schemas and back
//!
//! This tool reads `struct __attribute__((packed))` declarations and writes a
//! schema listing each packet's fields and byte offsets, or regenerates the
//! header from such a schema.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser};
use packdef_core::{convert_file, convert_str, ConvertConfig, Direction, TypeWidthTable};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Convert between packed C struct headers and YAML signal schemas
#[derive(Parser, Debug)]
#[command(name = "packdef")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    mode: ConversionMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Extra or overriding type width, e.g. --type Vector3=12 (repeatable)
    #[arg(long = "type", value_name = "NAME=WIDTH")]
    types: Vec<String>,

    /// Accept schemas whose size_check disagrees with their fields
    #[arg(long)]
    lenient_size: bool,

    /// Print the converted output instead of writing it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
#[group(required = false, multiple = false)]
struct ConversionMode {
    /// Convert a C header to YAML
    #[arg(long, num_args = 2, value_names = ["INPUT_HEADER", "OUTPUT_YAML"])]
    to_yaml: Option<Vec<PathBuf>>,

    /// Convert YAML to a C header
    #[arg(long, num_args = 2, value_names = ["INPUT_YAML", "OUTPUT_HEADER"])]
    to_header: Option<Vec<PathBuf>>,
}

impl ConversionMode {
    /// Returns the selected direction with its input and output paths
    fn selected(&self) -> Option<(Direction, &Path, &Path)> {
        let (direction, paths) = match (&self.to_yaml, &self.to_header) {
            (Some(paths), _) => (Direction::ToSchema, paths),
            (None, Some(paths)) => (Direction::ToDeclaration, paths),
            (None, None) => return None,
        };
        match paths.as_slice() {
            [input, output] => Some((direction, input.as_path(), output.as_path())),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some((direction, input, output)) = cli.mode.selected() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = build_config(&cli)?;
    run(&cli, &config, direction, input, output)
}

/// Builds the conversion config from command-line flags
fn build_config(cli: &Cli) -> Result<ConvertConfig> {
    let mut table = TypeWidthTable::new();
    for spec in &cli.types {
        table = table
            .with_override(spec)
            .with_context(|| format!("Invalid --type value: {}", spec))?;
        debug!("Registered type width {}", spec);
    }

    Ok(ConvertConfig::new()
        .table(table)
        .verify_size(!cli.lenient_size))
}

/// Runs one conversion
fn run(
    cli: &Cli,
    config: &ConvertConfig,
    direction: Direction,
    input: &Path,
    output: &Path,
) -> Result<()> {
    info!("Converting {} ({})", input.display(), direction.as_str());

    if cli.dry_run {
        let source = fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        let conversion = convert_str(direction, &source, config)
            .with_context(|| format!("Failed to convert {}", input.display()))?;
        println!("Would write: {}", output.display());
        print!("{}", conversion.output);
        return Ok(());
    }

    let conversion = convert_file(direction, input, output, config).with_context(|| {
        format!(
            "Failed to convert {} to {}",
            input.display(),
            output.display()
        )
    })?;

    let stats = conversion.stats();
    info!(
        "Summary: {} records, {} headers, {} fields ({} arrays)",
        stats.record_count, stats.header_count, stats.field_count, stats.array_count
    );

    println!("Converted {} to {}", input.display(), output.display());
    Ok(())
}
