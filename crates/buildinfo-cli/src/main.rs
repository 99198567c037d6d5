mod cmd;
mod output;
mod plan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "buildinfo",
    about = "Aggregate per-module build info and publish it once per run",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a build run from a plan file and publish it when the last unit completes
    Publish {
        /// Run plan (units, fragments, artifact files)
        #[arg(long)]
        plan: PathBuf,

        /// Publisher configuration
        #[arg(long, env = "BUILDINFO_CONFIG")]
        config: Option<PathBuf>,

        /// Run-scoped property file to delete once the run has published
        #[arg(long, env = "BUILDINFO_PROPFILE")]
        props_file: Option<PathBuf>,
    },

    /// Validate a publisher configuration
    Validate {
        #[arg(long, env = "BUILDINFO_CONFIG")]
        config: PathBuf,
    },

    /// Show an exported build-info file
    Show { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Publish {
            plan,
            config,
            props_file,
        } => cmd::publish::run(&plan, config.as_deref(), props_file, cli.json),
        Commands::Validate { config } => cmd::validate::run(&config, cli.json),
        Commands::Show { file } => cmd::show::run(&file, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
