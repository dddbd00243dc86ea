//! Prism CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Context, Outcome};

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Split source files into a node graph and rebuild them from it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Model file (defaults to <root>/.prism/model.json)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every supported file into the model
    Extract {
        /// Directory to extract (defaults to the root); acts as the root for this run
        dir: Option<PathBuf>,
    },
    /// Rebuild one file from the model
    Project {
        /// File path relative to the root
        file: String,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare a file's projection with the file on disk
    Validate {
        /// File path relative to the root
        file: String,

        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Delete the model
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("prism={}", log_level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Prism v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    let context = Context::new(cli.root, cli.model);
    let result = match cli.command {
        Commands::Extract { dir } => commands::extract(&context, dir).await,
        Commands::Project { file, output } => commands::project(&context, &file, output.as_deref()),
        Commands::Validate { file, report } => commands::validate(&context, &file, report.as_deref()),
        Commands::Clear => commands::clear(&context),
        Commands::Version => {
            println!("prism v{}", env!("CARGO_PKG_VERSION"));
            Ok(Outcome::Success)
        }
    };

    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
