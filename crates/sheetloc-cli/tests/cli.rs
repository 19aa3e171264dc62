use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use sheetloc_core::store::{AnnotationStore, JsonAnnotationStore};
use sheetloc_core::{AnnotationSource, NewAnnotation, Rect};
use tempfile::TempDir;

fn sheetloc() -> Command {
    Command::cargo_bin("sheetloc").unwrap()
}

/// Config file with defaults and the working directory inside `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "pipeline": { "working_directory": dir.join("work") }
    });
    fs::write(&path, config.to_string()).unwrap();
    path
}

fn write_blank_page(path: &Path) {
    GrayImage::from_pixel(400, 300, Luma([255])).save(path).unwrap();
}

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    sheetloc()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"height_cutoff_ratio\": 0.75"))
        .stdout(predicate::str::contains("\"sidepanel_mode\": \"sparse_text_osd\""));
}

#[test]
fn config_set_then_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.json");

    sheetloc()
        .args(["config", "set", "selection.height_cutoff_ratio", "0.6", "--config"])
        .arg(&config)
        .assert()
        .success();

    sheetloc()
        .args(["config", "get", "selection.height_cutoff_ratio", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("0.6"));

    sheetloc()
        .args(["config", "set", "selection.no_such_key", "1", "--config"])
        .arg(&config)
        .assert()
        .failure();
}

#[test]
fn locate_blank_page_is_a_soft_miss() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let page = dir.path().join("blank.png");
    write_blank_page(&page);

    sheetloc()
        .arg("locate")
        .arg(&page)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"found\": false"))
        .stdout(predicate::str::contains("too few panels (0)"));
}

#[test]
fn locate_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    sheetloc()
        .arg("locate")
        .arg(dir.path().join("nope.png"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn refine_rejects_malformed_box() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("blank.png");
    write_blank_page(&page);

    sheetloc()
        .arg("refine")
        .arg(&page)
        .args(["--bbox", "10,20,30"])
        .assert()
        .failure();
}

#[test]
fn refine_needs_a_box_or_a_store() {
    sheetloc().arg("refine").assert().failure();
}

#[test]
fn refine_store_skips_annotations_without_a_readable_page() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let store_dir = dir.path().join("annotations");
    let store = JsonAnnotationStore::open(&store_dir).unwrap();
    store
        .save(
            NewAnnotation::new("gone", "A-101", Rect::new(10, 10, 50, 30), AnnotationSource::Heuristic)
                .with_image_path(dir.path().join("gone.png")),
        )
        .unwrap();
    store
        .save(
            NewAnnotation::new("done", "A-102", Rect::new(10, 10, 50, 30), AnnotationSource::Heuristic)
                .with_refined(true)
                .with_image_path(dir.path().join("done.png")),
        )
        .unwrap();

    sheetloc()
        .arg("refine")
        .arg("--store")
        .arg(&store_dir)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 annotations to refine"))
        .stdout(predicate::str::contains("0 refined, 0 dropped for manual annotation, 1 skipped"));

    assert!(!store.find_existing("gone").unwrap().unwrap().refined);
}

#[test]
fn batch_counts_soft_misses_and_writes_summary() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_blank_page(&input.join("a.png"));
    write_blank_page(&input.join("b.png"));
    let out = dir.path().join("out");

    sheetloc()
        .arg("batch")
        .arg(format!("{}/*.png", input.display()))
        .args(["-j", "2", "--summary", "--output-dir"])
        .arg(&out)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 found, 2 not found, 0 failed"));

    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert_eq!(summary.lines().count(), 3);
    assert!(out.join("a.json").exists());
}

#[test]
fn batch_records_misses_in_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let page = dir.path().join("blank.png");
    write_blank_page(&page);
    let store = dir.path().join("annotations");

    sheetloc()
        .arg("batch")
        .arg(page.display().to_string())
        .arg("--store")
        .arg(&store)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 skipped (already annotated), 0 saved, 0 removed"));

    assert!(store.is_dir());
}

#[test]
fn batch_counts_unreadable_pages_as_failures() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_blank_page(&input.join("a.png"));
    fs::write(input.join("bad.png"), b"definitely not a png").unwrap();
    let pattern = format!("{}/*.png", input.display());

    sheetloc()
        .arg("batch")
        .arg(&pattern)
        .arg("--continue-on-error")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 found, 1 not found, 1 failed"));

    sheetloc()
        .arg("batch")
        .arg(&pattern)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure();
}
