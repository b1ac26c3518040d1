//! CLI entry point: parses arguments and wires them into `colophon`'s
//! pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use colophon::directory::Directory;
use colophon::logbuffer;
use colophon::manifest::Manifest;
use colophon::pipeline::Context as PipelineContext;
use colophon::reporter;
use colophon::suite::Suite;
use log::LevelFilter;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "colophon")]
#[command(about = "Batch-verify files against a CSV manifest and a YAML suite")]
#[command(version)]
struct Args {
    /// Manifest CSV file
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,

    /// Suite YAML file
    #[arg(value_name = "SUITE")]
    suite: PathBuf,

    /// Directory containing the files to match
    #[arg(value_name = "SOURCE_DIR")]
    source_dir: PathBuf,

    /// Directory to write manifest.csv/summary.json/per-stage output into
    #[arg(short = 'w', long = "workdir", value_name = "DIR")]
    workdir: PathBuf,

    /// Treat skipped rows and unassociated files as failures
    #[arg(long)]
    strict: bool,

    /// Rows with no matched files are marked ignored instead of failed
    #[arg(long = "ignore-missing")]
    ignore_missing: bool,

    /// JSON file of extra values available to every template as globals
    #[arg(short = 'c', long = "context", value_name = "FILE")]
    context: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Bundle the workdir into a zip file after reporting and print its path
    #[arg(long)]
    zip: bool,
}

fn load_global_context(path: Option<&PathBuf>) -> Result<Value> {
    match path {
        None => Ok(Value::Object(serde_json::Map::new())),
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("Unable to open context file: {}", p.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in context file: {}", p.display()))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logbuffer::init(filter).context("logger already initialized")?;

    // Resolve the workdir against the current directory before `Directory`
    // changes it to `source_dir` below, so relative `--workdir` values still
    // land where the caller expects.
    let cwd = std::env::current_dir().context("Unable to determine current directory")?;
    let workdir = if args.workdir.is_absolute() {
        args.workdir.clone()
    } else {
        cwd.join(&args.workdir)
    };

    let manifest = Manifest::load(&args.manifest)
        .with_context(|| format!("Unable to open manifest - file missing: {}", args.manifest.display()))?;
    let suite = Suite::load(&args.suite)
        .with_context(|| format!("Unable to open suite: {}", args.suite.display()))?;
    let global_context = load_global_context(args.context.as_ref())?;
    let directory = Directory::load(&args.source_dir)
        .with_context(|| format!("Unable to read from specified directory: {}", args.source_dir.display()))?;

    let mut ctx = PipelineContext {
        directory,
        manifest,
        suite,
        workdir,
        global_context,
        strict: args.strict,
        ignore_missing: args.ignore_missing,
    };

    let code = ctx.run()?;

    if args.zip {
        let zip_path = reporter::zip_workdir(&ctx.workdir)?;
        log::info!("Bundled output into zip file: {}", zip_path.display());
        println!("{}", zip_path.display());
    }

    std::process::exit(code);
}
