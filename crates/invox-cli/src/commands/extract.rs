//! Extract command - run the pipeline on an uploaded document.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use invox_core::models::{ExtractionRecord, ExtractionStatus, ExtractionView, InvoiceData};

use super::{Context, parse_file_id};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Owner of the document
    #[arg(short, long)]
    user: String,

    /// File id (see 'invox list')
    file_id: String,

    /// Run again even if a result already exists
    #[arg(long)]
    force: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let ctx = Context::load(config_path)?;
    let owner = ctx.owner(&args.user)?;
    let file_id = parse_file_id(&args.file_id)?;
    let force = args.force;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message("Extracting invoice data...");
    pb.enable_steady_tick(Duration::from_millis(120));

    // OCR and the model call block; the HTTP client must also live off the runtime
    let record = tokio::task::spawn_blocking(move || -> anyhow::Result<ExtractionRecord> {
        let orchestrator = ctx.orchestrator()?;
        Ok(orchestrator.extract(owner.id, file_id, force)?)
    })
    .await??;

    pb.finish_and_clear();
    report_status(&record);

    let output = format_record(&record, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}

fn report_status(record: &ExtractionRecord) {
    match (record.status(), record.error_message()) {
        (ExtractionStatus::Done, None) => {
            eprintln!("{} Extraction complete", style("✓").green());
        }
        (ExtractionStatus::Done, Some(warning)) => {
            eprintln!("{} {}", style("⚠").yellow(), warning);
        }
        (_, message) => {
            eprintln!(
                "{} Extraction failed: {}",
                style("✗").red(),
                message.unwrap_or("unknown error")
            );
        }
    }
}

fn format_record(record: &ExtractionRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&ExtractionView::from(record))?),
        OutputFormat::Csv => format_csv(record),
        OutputFormat::Text => Ok(format_text(record)),
    }
}

fn format_csv(record: &ExtractionRecord) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "file_id",
        "status",
        "invoice_number",
        "invoice_date",
        "due_date",
        "vendor_name",
        "vendor_address",
        "gstin",
        "total_amount",
        "tax_amount",
        "currency",
        "purchase_order_number",
        "line_items",
        "error_message",
    ])?;

    let empty = InvoiceData::default();
    let data = record.structured_data().unwrap_or(&empty);
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let display = |value: Option<String>| value.unwrap_or_default();

    wtr.write_record([
        record.file_id.to_string(),
        record.status().to_string(),
        text(&data.invoice_number),
        display(data.invoice_date.map(|d| d.to_string())),
        display(data.due_date.map(|d| d.to_string())),
        text(&data.vendor_name),
        text(&data.vendor_address),
        text(&data.gstin),
        display(data.total_amount.map(|a| a.normalize().to_string())),
        display(data.tax_amount.map(|a| a.normalize().to_string())),
        text(&data.currency),
        text(&data.purchase_order_number),
        data.line_items.len().to_string(),
        record.error_message().unwrap_or_default().to_string(),
    ])?;

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(record: &ExtractionRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("File:   {}\n", record.file_id));
    output.push_str(&format!("Status: {}\n", record.status()));
    if let Some(message) = record.error_message() {
        output.push_str(&format!("Note:   {}\n", message));
    }

    let Some(data) = record.structured_data() else {
        return output;
    };
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    output.push('\n');
    output.push_str(&format!("Invoice: {}\n", or_dash(data.invoice_number.clone())));
    output.push_str(&format!("Date:    {}\n", or_dash(data.invoice_date.map(|d| d.to_string()))));
    output.push_str(&format!("Due:     {}\n", or_dash(data.due_date.map(|d| d.to_string()))));
    output.push_str(&format!("PO:      {}\n", or_dash(data.purchase_order_number.clone())));
    output.push('\n');

    output.push_str("Vendor:\n");
    output.push_str(&format!("  {}\n", or_dash(data.vendor_name.clone())));
    if let Some(address) = &data.vendor_address {
        output.push_str(&format!("  {}\n", address));
    }
    if let Some(gstin) = &data.gstin {
        output.push_str(&format!("  GSTIN: {}\n", gstin));
    }
    output.push('\n');

    let currency = data.currency.clone().unwrap_or_default();
    output.push_str("Summary:\n");
    output.push_str(&format!(
        "  Tax:   {} {}\n",
        or_dash(data.tax_amount.map(|a| a.normalize().to_string())),
        currency
    ));
    output.push_str(&format!(
        "  Total: {} {}\n",
        or_dash(data.total_amount.map(|a| a.normalize().to_string())),
        currency
    ));

    if !data.line_items.is_empty() {
        output.push_str("\nLine items:\n");
        for item in &data.line_items {
            output.push_str(&format!(
                "  {} x{} @ {} = {}\n",
                or_dash(item.description.clone()),
                or_dash(item.quantity.map(|q| q.normalize().to_string())),
                or_dash(item.unit_price.map(|p| p.normalize().to_string())),
                or_dash(item.line_total.map(|t| t.normalize().to_string())),
            ));
        }
    }

    output
}
