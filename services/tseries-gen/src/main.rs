//! CESM time-series generator.
//!
//! Produces regionally reduced series of model output, caching one artifact
//! per variable, component, experiment, ensemble member and frequency.
//! Concurrent invocations sharing a cache directory coordinate through
//! `.genlock` files.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use cesm_common::{Component, Frequency};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tseries-gen")]
#[command(about = "Cached regional time series of CESM output")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Catalog file (.yaml or .json)
    #[arg(long, env = "TSERIES_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// Variable specs file
    #[arg(long, env = "TSERIES_VAR_SPECS", global = true)]
    var_specs: Option<PathBuf>,

    /// Directory of cached series (overrides TSERIES_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate (or reuse) reduced series of one or more variables
    Tseries {
        /// Variable names
        #[arg(required = true)]
        varnames: Vec<String>,

        /// Model component: atm, ocn, ice or lnd
        #[arg(short, long)]
        component: Component,

        #[arg(short, long)]
        experiment: String,

        /// History stream (default: the component's stream in the var specs)
        #[arg(long)]
        stream: Option<String>,

        /// Output frequency: mon or ann
        #[arg(long, default_value = "mon")]
        freq: Frequency,

        /// Regenerate cached artifacts (default: the CLOBBER env var)
        #[arg(long)]
        clobber: Option<bool>,

        /// Subtract the monthly climatology from monthly series
        #[arg(long)]
        anomaly: bool,

        /// Write the combined dataset here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract the series at the grid cell nearest a location
    Latlon {
        varname: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(short, long)]
        component: Component,

        #[arg(short, long)]
        experiment: String,

        #[arg(long)]
        stream: Option<String>,

        #[arg(long)]
        clobber: Option<bool>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a catalog by scanning a CESM archive
    Scan {
        /// Archive root containing one directory per case
        root: PathBuf,

        /// Experiment and its cases in ensemble order, e.g.
        /// `esm-hist=b.e21.001,b.e21.002`; repeatable
        #[arg(long = "experiment", required = true)]
        experiments: Vec<String>,

        /// Where to write the YAML catalog
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tseries-gen");

    let sources = commands::Sources {
        catalog: args.catalog,
        var_specs: args.var_specs,
        cache_dir: args.cache_dir,
    };

    match args.command {
        Command::Tseries {
            varnames,
            component,
            experiment,
            stream,
            freq,
            clobber,
            anomaly,
            output,
        } => {
            let mut req = tseries::TseriesRequest::new(varnames, component, experiment).with_freq(freq);
            req.stream = stream;
            req.clobber = clobber;
            commands::run_tseries(&sources, &req, anomaly, output.as_deref())
        }
        Command::Latlon {
            varname,
            lat,
            lon,
            component,
            experiment,
            stream,
            clobber,
            output,
        } => {
            let req = tseries::PointRequest {
                varname,
                lat,
                lon,
                component,
                experiment,
                stream,
                clobber,
            };
            commands::run_latlon(&sources, &req, output.as_deref())
        }
        Command::Scan {
            root,
            experiments,
            output,
        } => commands::run_scan(&root, &experiments, &output),
    }
}
