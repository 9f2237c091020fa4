//! Process command - extract data from a single OCR word file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, info};

use invex_core::models::config::InvexConfig;
use invex_core::models::invoice::{InvoiceRecord, LineItem};
use invex_core::InvoicePipeline;

use crate::input::InvoiceInput;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (OCR word JSON or .txt transcript)
    #[arg(required = true)]
    input: PathBuf,

    /// Fallback OCR pass (word JSON)
    #[arg(long)]
    fallback: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (default: export.default_format from config)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Schema file used for validation
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Fail on any schema violation
    #[arg(long)]
    strict: bool,

    /// OCR merge strategy
    #[arg(long, value_parser = ["highest_confidence", "line_by_line", "word_by_word"])]
    strategy: Option<String>,

    /// Show OCR confidence and validation summary
    #[arg(long)]
    show_confidence: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    /// Resolve an explicit choice or fall back to the configured default.
    pub fn resolve(explicit: Option<Self>, config: &InvexConfig) -> anyhow::Result<Self> {
        if let Some(format) = explicit {
            return Ok(format);
        }
        match config.export.default_format.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => anyhow::bail!("Unsupported output format in configuration: {}", other),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = InvexConfig::load(config_path.map(Path::new))?;
    if let Some(schema) = &args.schema {
        config.validation.schema = Some(schema.clone());
    }
    if args.strict {
        config.validation.strict_mode = true;
    }
    if let Some(strategy) = &args.strategy {
        config.ocr.merge_strategy = strategy.clone();
    }
    let format = OutputFormat::resolve(args.format, &config)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
            .progress_chars("##-"),
    );

    pb.set_message("Reading input...");
    pb.set_position(10);
    let input = InvoiceInput::read(&args.input, args.fallback.as_deref())?;

    pb.set_message("Extracting invoice data...");
    pb.set_position(40);
    let mut pipeline = InvoicePipeline::from_config(&config)?;
    let record = input.process(&mut pipeline, &args.input)?;

    pb.set_position(100);
    pb.finish_with_message("Done");

    let report = &record.metadata.validation;
    if !report.validation_errors.is_empty() {
        eprintln!("{}", style("Validation issues:").yellow());
        for issue in &report.validation_errors {
            eprintln!("  - {}: {}", issue.path, issue.message);
        }
    }

    let output = format_record(&record, format)?;

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

    if args.show_confidence {
        println!();
        if let Some(confidence) = record.metadata.confidence_score {
            println!(
                "{} OCR confidence: {:.1}% ({})",
                style("ℹ").blue(),
                confidence * 100.0,
                record.metadata.ocr_engine.as_deref().unwrap_or("unknown")
            );
        }
        println!(
            "{} Validation: {}",
            style("ℹ").blue(),
            match report.validation_passed {
                Some(true) => style("passed").green(),
                _ => style("failed").red(),
            }
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render one record in the requested format.
pub fn format_record(record: &InvoiceRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Csv => format_csv(std::slice::from_ref(record)),
        OutputFormat::Text => Ok(format_text(record)),
    }
}

const LINE_ITEM_COLUMNS: [&str; 4] = ["description", "qty", "unit_price", "line_total"];

/// Flatten records into CSV: one column per top-level field, then
/// `line_item_<n>_<field>` columns. Metadata is left out.
pub fn format_csv(records: &[InvoiceRecord]) -> anyhow::Result<String> {
    let mut fields: Vec<&str> = Vec::new();
    for record in records {
        for name in record.fields.keys() {
            if !fields.contains(&name.as_str()) {
                fields.push(name);
            }
        }
    }
    let max_items = records
        .iter()
        .filter_map(|r| r.line_items.as_ref().map(Vec::len))
        .max()
        .unwrap_or(0);

    let mut header: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    for n in 1..=max_items {
        for column in LINE_ITEM_COLUMNS {
            header.push(format!("line_item_{}_{}", n, column));
        }
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&header)?;

    for record in records {
        let mut row: Vec<String> = fields
            .iter()
            .map(|name| record.get(name).map(cell).unwrap_or_default())
            .collect();

        let items = record.line_items.as_deref().unwrap_or(&[]);
        for n in 0..max_items {
            match items.get(n) {
                Some(item) => row.extend(line_item_cells(item)),
                None => row.extend(std::iter::repeat_n(String::new(), LINE_ITEM_COLUMNS.len())),
            }
        }
        wtr.write_record(&row)?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn line_item_cells(item: &LineItem) -> [String; 4] {
    [
        item.description.clone(),
        item.qty.clone(),
        item.unit_price.clone(),
        item.line_total.clone(),
    ]
}

fn format_text(record: &InvoiceRecord) -> String {
    let field = |name: &str| record.get(name).map(cell).unwrap_or_else(|| "-".to_string());
    let mut output = String::new();

    output.push_str(&format!("Invoice: {}\n", field("invoice_number")));
    output.push_str(&format!("Date: {}\n", field("issue_date")));
    output.push('\n');

    output.push_str("Vendor:\n");
    output.push_str(&format!("  {}\n", field("vendor_name")));
    if let Some(tax_id) = record.get_str("vendor_tax_id") {
        output.push_str(&format!("  NIF: {}\n", tax_id));
    }
    output.push('\n');

    output.push_str("Buyer:\n");
    output.push_str(&format!("  {}\n", field("buyer_name")));
    output.push('\n');

    output.push_str("Summary:\n");
    output.push_str(&format!("  VAT rate: {}\n", field("vat_rate")));
    output.push_str(&format!("  VAT:      {}\n", field("vat_amount")));
    output.push_str(&format!("  Total:    {}\n", field("total_eur")));

    if let Some(terms) = record.get_str("payment_terms") {
        output.push_str(&format!("\nPayment: {}\n", terms));
    }

    if let Some(items) = record.line_items.as_ref().filter(|items| !items.is_empty()) {
        output.push_str("\nLine items:\n");
        for item in items {
            output.push_str(&format!(
                "  - {} ({} x {} = {})\n",
                item.description, item.qty, item.unit_price, item.line_total
            ));
        }
    }

    let report = &record.metadata.validation;
    let status = match report.validation_passed {
        Some(true) => "passed",
        Some(false) => "failed",
        None => "not run",
    };
    output.push_str(&format!(
        "\nValidation: {} ({} errors, {} warnings)\n",
        status,
        report.validation_errors.len(),
        report.validation_warnings.len()
    ));

    output
}
