//! Owner and document commands: register, upload, list, show, delete.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use invox_core::models::ExtractionView;

use super::{Context, parse_file_id};

/// Arguments for the register command.
#[derive(Args)]
pub struct RegisterArgs {
    /// Username of the new owner
    username: String,
}

/// Arguments for the upload command.
#[derive(Args)]
pub struct UploadArgs {
    /// Owner of the document
    #[arg(short, long)]
    user: String,

    /// Document to upload (PNG, JPEG or PDF)
    #[arg(required = true)]
    input: PathBuf,
}

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Owner whose documents to list
    #[arg(short, long)]
    user: String,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// Arguments for commands addressing one document.
#[derive(Args)]
pub struct FileArgs {
    /// Owner of the document
    #[arg(short, long)]
    user: String,

    /// File id (see 'invox list')
    file_id: String,
}

pub async fn register(args: RegisterArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let owner = ctx.documents().register_owner(&args.username)?;

    println!(
        "{} Registered {} ({})",
        style("✓").green(),
        style(&owner.username).bold(),
        owner.id
    );
    Ok(())
}

pub async fn upload(args: UploadArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let ctx = Context::load(config_path)?;
    let owner = ctx.owner(&args.user)?;

    let data = fs::read(&args.input)?;
    let filename = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", args.input.display()))?;

    info!("Uploading {} for {}", args.input.display(), owner.username);
    let file = ctx.documents().upload(&owner, filename, &data)?;

    println!("{} Uploaded {} as {}", style("✓").green(), file.filename, file.id);
    println!("Run 'invox extract --user {} {}' to extract it.", owner.username, file.id);
    Ok(())
}

pub async fn list(args: ListArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let owner = ctx.owner(&args.user)?;
    let files = ctx.documents().list(&owner)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("{} No documents for {}.", style("ℹ").blue(), owner.username);
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:<20}  FILENAME", "ID", "STATUS", "UPLOADED");
    for summary in &files {
        println!(
            "{:<36}  {:<10}  {:<20}  {}",
            summary.file.id,
            summary.status.as_str(),
            summary.file.created_at.format("%Y-%m-%d %H:%M:%S"),
            summary.file.filename
        );
    }
    Ok(())
}

pub async fn show(args: FileArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let owner = ctx.owner(&args.user)?;
    let file_id = parse_file_id(&args.file_id)?;

    let record = ctx
        .documents()
        .record(&owner, file_id)?
        .ok_or_else(|| anyhow::anyhow!("No document {} for {}", file_id, owner.username))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&ExtractionView::from(&record))?
    );
    Ok(())
}

pub async fn delete(args: FileArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = Context::load(config_path)?;
    let owner = ctx.owner(&args.user)?;
    let file_id = parse_file_id(&args.file_id)?;

    if !ctx.documents().delete(&owner, file_id)? {
        anyhow::bail!("No document {} for {}", file_id, owner.username);
    }

    println!("{} Deleted {}", style("✓").green(), file_id);
    Ok(())
}
