//! Tremor CLI — Command-line interface for tremor analysis.
//!
//! Usage:
//!   tremor analyze <VIDEO> --age <N> --patient <ID>   Analyze a clip in the foreground
//!   tremor submit <VIDEO> --age <N> --patient <ID>    Run a clip through the job runner
//!   tremor history <PATIENT>                         List a patient's stored results
//!   tremor check                                     Check tools and models
//!   tremor config                                    Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tremor_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "tremor",
    about = "Hand tremor assessment from short video clips",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a clip synchronously and print the result
    Analyze {
        /// Path to the video clip
        video: PathBuf,

        /// Patient age in years (selects the pass band)
        #[arg(long)]
        age: u32,

        /// Patient identifier
        #[arg(long)]
        patient: String,

        /// Store the result and link it to the patient
        #[arg(long)]
        save: bool,

        /// Skip rendering the signal graph
        #[arg(long)]
        no_graph: bool,

        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a clip to an in-process job runner and follow its progress
    Submit {
        /// Path to the video clip
        video: PathBuf,

        /// Patient age in years
        #[arg(long)]
        age: u32,

        /// Patient identifier
        #[arg(long)]
        patient: String,
    },

    /// List stored results for a patient, newest first
    History {
        /// Patient identifier
        patient: String,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check external tools and models
    Check,

    /// Print the effective configuration
    Config {
        /// Write it to the standard location
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    tremor_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Analyze {
            video,
            age,
            patient,
            save,
            no_graph,
            json,
        } => commands::analyze::run(&config, video, age, patient, save, !no_graph, json),
        Commands::Submit {
            video,
            age,
            patient,
        } => commands::submit::run(&config, video, age, patient).await,
        Commands::History { patient, json } => commands::history::run(&config, patient, json),
        Commands::Check => commands::check::run(&config),
        Commands::Config { write } => commands::config::run(&config, write),
    }
}
