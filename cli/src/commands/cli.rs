use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pbench", version, about = "Run staged query benchmarks")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.pbench/config.toml or ./pbench.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a stage graph starting at the given stage file.
    Run(RunArgs),
    /// Load a stage graph and print its execution layers without running it.
    Plan(PlanArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Root stage file (JSON).
    pub stage_file: PathBuf,

    /// Coordinator URL, e.g. http://127.0.0.1:8080.
    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    /// Directory the run directory is created in. Defaults to the root
    /// stage's output_path.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Cancel the whole run after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// How long to keep collecting results after an interrupt.
    #[arg(long, value_name = "MS")]
    pub shutdown_grace: Option<u64>,

    /// Client tag sent with every query. Can be specified multiple times.
    #[arg(long = "client-tag", action = clap::ArgAction::Append)]
    pub client_tags: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    /// Root stage file (JSON).
    pub stage_file: PathBuf,
}
