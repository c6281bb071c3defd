#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use qdd_core::{paths, Config, ConfigFlags};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qdd")]
#[command(
    author,
    version,
    about = "Install node_modules from package-lock.json through a content-addressed cache",
    long_about = None
)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON formatted output
    #[arg(long)]
    json: bool,

    /// Override the project directory
    #[arg(long, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Cache directory (default: ~/.cache/qdd)
    #[arg(long = "cache", value_name = "DIR")]
    cache: Option<PathBuf>,

    /// Log every install decision
    #[arg(long)]
    debug: bool,

    /// Maximum number of packages installed at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Skip development dependencies
    #[arg(long = "prod", visible_alias = "production")]
    production: bool,

    /// Bypass the cache
    #[arg(long = "nocache", visible_alias = "no-cache")]
    no_cache: bool,

    /// Only populate the cache; do not write node_modules
    #[arg(long = "cacheonly", visible_alias = "cache-only")]
    cache_only: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Checked before anything is logged or read
    if paths::node_modules_dir(&cwd).exists() {
        eprintln!("{}", commands::install::NODE_MODULES_PRESENT);
        std::process::exit(1);
    }

    let flags = ConfigFlags {
        cache_dir: cli.cache,
        debug: cli.debug,
        concurrency: cli.concurrency,
        production: cli.production,
        no_cache: cli.no_cache,
        cache_only: cli.cache_only,
    };

    let config = match Config::from_env(cwd, &flags) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let verbosity = if config.debug {
        cli.verbose.max(1)
    } else {
        cli.verbose
    };
    let config = config.with_verbosity(verbosity).with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    commands::install::run(&config)
}
