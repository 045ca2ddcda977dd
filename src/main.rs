// USAGE nc-sensors crawl /path/to/raw --copy-to /path/to/corpus
//       nc-sensors merge /path/to/corpus
//       nc-sensors ncml  /path/to/corpus --target merged.nc

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use nc_sensors::crawl::REPORT_FILE;
use nc_sensors::ncml::MANIFEST_FILE;
use nc_sensors::{
    crawl, merge, write_descriptors, write_manifest, write_report, Config, CoordinatePolicy,
    CopyPolicy, LocalFs, MergeOptions, NetcdfStore,
};

/// Crawl, re-map, merge and aggregate sensor NetCDF files
#[derive(Parser)]
#[command(name = "nc-sensors")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map identities of every NetCDF file under the roots and report them
    Crawl {
        #[arg(value_name = "ROOT", required = true)]
        roots: Vec<PathBuf>,

        /// Copy each file into <DIR>/<mapped sensor>/
        #[arg(long, value_name = "DIR")]
        copy_to: Option<PathBuf>,

        /// JSON report path
        #[arg(long, default_value = REPORT_FILE)]
        report: PathBuf,
    },

    /// Merge the files of each sensor directory into one
    Merge {
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Output file name inside each sensor directory
        #[arg(short, long, default_value = nc_sensors::merge::MERGED_FILE)]
        output: String,

        /// Overrides the configured coordinate policy
        #[arg(long, value_enum)]
        coordinates: Option<CoordinatePolicy>,
    },

    /// Write an NcML descriptor into each sensor directory
    Ncml {
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Descriptor file name (defaults to <sensor urn>.ncml)
        #[arg(short, long)]
        output: Option<String>,

        /// Describe only this file instead of aggregating the directory
        #[arg(long)]
        target: Option<String>,

        /// JSON list of written descriptors
        #[arg(long, default_value = MANIFEST_FILE)]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Crawl { roots, copy_to, report } => run_crawl(&config, roots, copy_to, &report),
        Commands::Merge { root, output, coordinates } => run_merge(&config, &root, output, coordinates),
        Commands::Ncml { root, output, target, manifest } => {
            run_ncml(&root, output.as_deref(), target.as_deref(), &manifest)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run_crawl(config: &Config, roots: Vec<PathBuf>, copy_to: Option<PathBuf>, report: &Path) -> Result<()> {
    for root in &roots {
        if !root.is_dir() {
            bail!("Not a directory: {}", root.display());
        }
    }
    let copy = copy_to.map(CopyPolicy::to).unwrap_or_else(|| config.copy.clone());

    let crawled = crawl(&roots, &config.maps, &copy, &NetcdfStore, &LocalFs);
    write_report(report, &crawled, &LocalFs)
        .with_context(|| format!("Failed to write report: {}", report.display()))?;
    info!("Wrote {} station(s) to {}", crawled.len(), report.display());
    Ok(())
}

fn run_merge(config: &Config, root: &Path, output: String, coordinates: Option<CoordinatePolicy>) -> Result<()> {
    let options = MergeOptions {
        output_filename: output,
        fill_value: config.fill_value,
        coordinate_policy: coordinates.unwrap_or(config.coordinate_policy),
    };
    let summary = merge(root, &options, &NetcdfStore, &LocalFs)
        .with_context(|| format!("Merge of {} failed", root.display()))?;

    for (sensor, reason) in &summary.skipped {
        eprintln!("skipped {sensor}: {reason}");
    }
    info!("{} merged file(s) written", summary.written.len());
    Ok(())
}

fn run_ncml(root: &Path, output: Option<&str>, target: Option<&str>, manifest: &Path) -> Result<()> {
    let written = write_descriptors(root, output, target, &NetcdfStore, &LocalFs)
        .with_context(|| format!("Descriptor pass over {} failed", root.display()))?;
    write_manifest(manifest, &written, &LocalFs)
        .with_context(|| format!("Failed to write manifest: {}", manifest.display()))?;
    info!("Wrote {} descriptor(s)", written.len());
    Ok(())
}
