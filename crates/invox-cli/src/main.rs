//! CLI application for encrypted invoice intake and extraction.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, documents, extract};

/// Encrypted invoice intake - upload documents and extract structured invoice data
#[derive(Parser)]
#[command(name = "invox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a document owner
    Register(documents::RegisterArgs),

    /// Encrypt and store a document
    Upload(documents::UploadArgs),

    /// List an owner's documents
    List(documents::ListArgs),

    /// Extract invoice data from an uploaded document
    Extract(extract::ExtractArgs),

    /// Show the stored extraction record of a document
    Show(documents::FileArgs),

    /// Delete a document and its extraction record
    Delete(documents::FileArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Register(args) => documents::register(args, config_path).await,
        Commands::Upload(args) => documents::upload(args, config_path).await,
        Commands::List(args) => documents::list(args, config_path).await,
        Commands::Extract(args) => extract::run(args, config_path).await,
        Commands::Show(args) => documents::show(args, config_path).await,
        Commands::Delete(args) => documents::delete(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
