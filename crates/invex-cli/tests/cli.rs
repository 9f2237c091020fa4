//! Integration tests for the invex binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TRANSCRIPT: &str = "ACME SOLUCIONES S.L.
CIF: B12345678
FACTURA Nº: F2023-1234
Fecha: 15/06/2023
Cliente: Juan Pérez
NIF: 12345678Z
Descripción Cantidad Precio Total
Diseño web 1 800,00 € 800,00 €
Hosting anual 2 100,00 € 200,00 €
Subtotal: 1.000,00 €
IVA 21%: 210,00 €
Total: 1.210,00 €
";

const PRIMARY_WORDS: &str = r#"[
  {"text": "Factura", "conf": 0.92, "box": [0, 0, 60, 10], "page": 0},
  {"text": "Nº:", "conf": 0.90, "box": [70, 0, 100, 10], "page": 0},
  {"text": "F2023-1234", "conf": 0.95, "box": [110, 0, 200, 10], "page": 0},
  {"text": "Fecha:", "conf": 0.91, "box": [0, 30, 50, 40], "page": 0},
  {"text": "1/5/23", "conf": 0.88, "box": [60, 30, 120, 40], "page": 0}
]"#;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("invex").unwrap();
    cmd.env_remove("INVEX__OCR__MERGE_STRATEGY")
        .env_remove("INVEX__VALIDATION__STRICT_MODE");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============ PROCESS COMMAND TESTS ============

#[test]
fn test_process_word_file_to_json() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "invoice.json", PRIMARY_WORDS);

    cli()
        .arg("process")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""invoice_number": "F2023-1234""#))
        .stdout(predicate::str::contains(r#""issue_date": "01/05/2023""#))
        .stdout(predicate::str::contains(r#""ocr_engine": "primary""#))
        .stdout(predicate::str::contains(r#""source_file": "invoice.json""#));
}

#[test]
fn test_process_with_fallback_is_hybrid() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "invoice.json", PRIMARY_WORDS);
    let fallback = write(dir.path(), "other.json", PRIMARY_WORDS);

    cli()
        .arg("process")
        .arg(&input)
        .arg("--fallback")
        .arg(&fallback)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""ocr_engine": "hybrid""#));
}

#[test]
fn test_process_transcript_to_text() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "invoice.txt", TRANSCRIPT);

    cli()
        .arg("process")
        .arg(&input)
        .args(["-f", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Invoice: F2023-1234"))
        .stdout(predicate::str::contains("Total:    1.210,00 €"))
        .stdout(predicate::str::contains("Diseño web"));
}

#[test]
fn test_process_csv_output_file() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "invoice.txt", TRANSCRIPT);
    let output = dir.path().join("out.csv");

    cli()
        .arg("process")
        .arg(&input)
        .args(["-f", "csv", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Output written to"));

    let content = fs::read_to_string(&output).unwrap();
    let header = content.lines().next().unwrap();
    assert!(header.contains("invoice_number"));
    assert!(header.contains("line_item_2_line_total"));
    assert!(!header.contains("metadata"));
}

#[test]
fn test_process_strict_fails_on_missing_fields() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "partial.txt", "Factura Nº: F-1\n");

    cli()
        .arg("process")
        .arg(&input)
        .arg("--strict")
        .assert()
        .failure()
        .stderr(predicate::str::contains("issue_date"));
}

#[test]
fn test_process_non_strict_reports_issues() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "partial.txt", "Factura Nº: F-1\n");

    cli()
        .arg("process")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("Validation issues:"))
        .stdout(predicate::str::contains(r#""validation_passed": false"#));
}

#[test]
fn test_process_missing_input() {
    cli()
        .arg("process")
        .arg("/nonexistent/invoice.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_process_invalid_word_file() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "broken.json", "{not json");

    cli()
        .arg("process")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid OCR word file"));
}

#[test]
fn test_process_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "invoice.txt", TRANSCRIPT);
    let config = write(
        dir.path(),
        "config.json",
        r#"{"export": {"default_format": "text"}}"#,
    );

    cli()
        .arg("-c")
        .arg(&config)
        .arg("process")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Invoice: F2023-1234"));
}

// ============ BATCH COMMAND TESTS ============

#[test]
fn test_batch_with_summary() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    write(dir.path(), "a.txt", TRANSCRIPT);
    write(dir.path(), "b.json", PRIMARY_WORDS);
    write(dir.path(), "b.fallback.json", PRIMARY_WORDS);
    write(dir.path(), "c.json", "{not json");

    cli()
        .arg("batch")
        .arg(format!("{}/*", dir.path().display()))
        .arg("-o")
        .arg(&out)
        .args(["--summary", "--continue-on-error", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 files"))
        .stdout(predicate::str::contains("Failed files:"));

    assert!(out.join("a.json").exists());
    assert!(out.join("b.json").exists());
    assert!(!out.join("c.json").exists());

    let b = fs::read_to_string(out.join("b.json")).unwrap();
    assert!(b.contains(r#""ocr_engine": "hybrid""#));

    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.starts_with("filename,status,invoice_number"));
    assert!(summary.contains("a.txt,success,F2023-1234,15/06/2023"));
    assert!(summary.contains("c.json,error"));
}

#[test]
fn test_batch_stops_on_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "c.json", "{not json");

    cli()
        .arg("batch")
        .arg(format!("{}/*.json", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Processing failed"));
}

#[test]
fn test_batch_no_matches() {
    let dir = TempDir::new().unwrap();

    cli()
        .arg("batch")
        .arg(format!("{}/*.json", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

// ============ CONFIG COMMAND TESTS ============

#[test]
fn test_config_init_get_set() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.json");

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not created"))
        .stdout(predicate::str::contains("invex config init"));

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(config.exists());

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "set", "ocr.merge_strategy", "line_by_line"])
        .assert()
        .success();

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "get", "ocr.merge_strategy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"line_by_line\""));
}

#[test]
fn test_config_set_unknown_key() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");

    cli()
        .arg("-c")
        .arg(&config)
        .args(["config", "set", "ocr.bogus", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown configuration key"));
}
