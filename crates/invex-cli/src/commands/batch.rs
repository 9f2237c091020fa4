//! Batch processing command for multiple OCR word files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use invex_core::models::config::InvexConfig;
use invex_core::models::invoice::InvoiceRecord;
use invex_core::InvoicePipeline;

use super::process::{format_csv, format_record, OutputFormat};
use crate::input::{fallback_sibling, is_fallback_file, InvoiceInput};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file (default: export.default_format from config)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Also write every record into one combined CSV
    #[arg(long)]
    combined: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Schema file used for validation
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Fail on any schema violation
    #[arg(long)]
    strict: bool,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    record: Option<InvoiceRecord>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = InvexConfig::load(config_path.map(Path::new))?;
    if let Some(schema) = &args.schema {
        config.validation.schema = Some(schema.clone());
    }
    if args.strict {
        config.validation.strict_mode = true;
    }
    let format = OutputFormat::resolve(args.format, &config)?;

    let files = collect_inputs(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let multi_progress = MultiProgress::new();
    let overall_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    // The schema is loaded once; each task gets its own clone.
    let pipeline = InvoicePipeline::from_config(&config)?;
    let semaphore = Arc::new(Semaphore::new(args.jobs.max(1)));

    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let mut pipeline = pipeline.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let file_start = Instant::now();
            let outcome = process_single_file(&path, &mut pipeline);
            drop(permit);
            (path, outcome, file_start.elapsed().as_millis() as u64)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let (path, outcome, processing_time_ms) = handle.await?;

        match outcome {
            Ok(record) => {
                results.push(ProcessResult {
                    path,
                    record: Some(record),
                    error: None,
                    processing_time_ms,
                });
            }
            Err(e) => {
                let error_msg = format!("{:#}", e);
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(ProcessResult {
                        path,
                        record: None,
                        error: Some(error_msg),
                        processing_time_ms,
                    });
                } else {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing failed for {}: {}", path.display(), error_msg);
                }
            }
        }

        overall_pb.inc(1);
    }

    overall_pb.finish_with_message("Complete");

    let successful: Vec<_> = results.iter().filter(|r| r.record.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &successful {
            let Some(record) = &result.record else {
                continue;
            };
            let output_name = result
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("invoice");
            let output_path = output_dir.join(format!("{}.{}", output_name, format.extension()));

            fs::write(&output_path, format_record(record, format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.combined {
        let records: Vec<InvoiceRecord> =
            successful.iter().filter_map(|r| r.record.clone()).collect();
        let combined_path = output_path_for(&args.output_dir, "invoices.csv");
        fs::write(&combined_path, format_csv(&records)?)?;
        println!(
            "{} Combined CSV written to {}",
            style("✓").green(),
            combined_path.display()
        );
    }

    if args.summary {
        let summary_path = output_path_for(&args.output_dir, "summary.csv");
        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    let invalid = successful
        .iter()
        .filter(|r| {
            r.record
                .as_ref()
                .is_some_and(|rec| rec.metadata.validation.validation_passed == Some(false))
        })
        .count();
    if invalid > 0 {
        println!(
            "   {} failed schema validation",
            style(invalid).yellow()
        );
    }

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Expand `pattern` to word files and transcripts, skipping fallback passes.
fn collect_inputs(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob(pattern)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && !is_fallback_file(p))
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(ext.to_lowercase().as_str(), "json" | "txt")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn process_single_file(path: &Path, pipeline: &mut InvoicePipeline) -> anyhow::Result<InvoiceRecord> {
    let fallback = fallback_sibling(path);
    if let Some(fallback) = &fallback {
        debug!("Using fallback pass {}", fallback.display());
    }
    let input = InvoiceInput::read(path, fallback.as_deref())?;
    Ok(input.process(pipeline, path)?)
}

fn output_path_for(output_dir: &Option<PathBuf>, name: &str) -> PathBuf {
    output_dir
        .as_ref()
        .map(|d| d.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "invoice_number",
        "issue_date",
        "vendor_name",
        "vendor_tax_id",
        "total_eur",
        "confidence",
        "validation_passed",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(record) = &result.record {
            let field = |name: &str| record.get_str(name).unwrap_or("").to_string();
            let confidence = record
                .metadata
                .confidence_score
                .map(|c| format!("{:.2}", c))
                .unwrap_or_default();
            let passed = record
                .metadata
                .validation
                .validation_passed
                .map(|p| p.to_string())
                .unwrap_or_default();

            wtr.write_record([
                filename,
                "success",
                &field("invoice_number"),
                &field("issue_date"),
                &field("vendor_name"),
                &field("vendor_tax_id"),
                &field("total_eur"),
                &confidence,
                &passed,
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
