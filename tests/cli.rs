//! CLI test cases.
//!
//! Everything here runs offline: transcription tests use the `echo` driver and
//! local image directories. The one test that talks to Gemini is ignored by
//! default.

use std::{fs, path::Path, process::Command};

use assert_cmd::prelude::*;
use image::{DynamicImage, Rgb, RgbImage};
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("archive-transcriber").unwrap();
    // Keep developer credentials and log settings out of our tests.
    cmd.env_remove("GEMINI_API_KEY")
        .env_remove("GEMINI_API_BASE")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a small PNG with a bright rectangle on a black background.
fn write_scan(path: &Path, brightness: u8) {
    let mut img = RgbImage::new(32, 24);
    for y in 4..20 {
        for x in 6..26 {
            img.put_pixel(x, y, Rgb([brightness; 3]));
        }
    }
    DynamicImage::ImageRgb8(img).save(path).unwrap();
}

/// Sorted file names in `dir`.
fn file_names(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_transcribe_help_lists_path_flags() {
    cmd()
        .args(["transcribe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--image_dir"))
        .stdout(predicate::str::contains("--output_file"))
        .stdout(predicate::str::contains("--state_file"));
}

#[test]
fn test_crop_writes_cropped_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    let output = dir.path().join("cropped.jpg");
    write_scan(&input, 220);

    cmd()
        .arg("crop")
        .arg(&input)
        .arg(&output)
        .args(["--method", "dark_tol", "--quality", "80"])
        .assert()
        .success();

    let cropped = image::open(&output).unwrap();
    assert_eq!((cropped.width(), cropped.height()), (20, 16));
}

#[test]
fn test_crop_dark_image_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("dark.png");
    let output = dir.path().join("cropped.png");
    write_scan(&input, 30);

    cmd()
        .arg("crop")
        .arg(&input)
        .arg(&output)
        .args(["--method", "dark_tol"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No object found"));
    assert!(!output.exists());
}

#[test]
fn test_crop_rejects_unknown_method() {
    cmd()
        .args(["crop", "in.png", "out.png", "--method", "bbox"])
        .assert()
        .failure();
}

#[test]
fn test_transcribe_without_api_key_fails_before_work() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .arg("transcribe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn test_transcribe_dry_run_lists_next_batch() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["transcribe", "--dry-run", "--batch-size", "3", "--base-url"])
        .arg("https://archive.invalid/scans/")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "00001.JPG\thttps://archive.invalid/scans/00001.JPG",
        ))
        .stdout(predicate::str::contains("00003.JPG"))
        .stdout(predicate::str::contains("00004.JPG").not());
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn test_transcribe_echo_then_consolidate() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    fs::create_dir(&images).unwrap();
    for n in 1..=3 {
        write_scan(&images.join(format!("{n:05}.png")), 200);
    }
    let outputs = dir.path().join("outputs");
    let state = dir.path().join("processed_files.txt");
    let transcript = dir.path().join("transcriptions.txt");

    let transcribe = || {
        let mut c = cmd();
        c.current_dir(dir.path())
            .args(["transcribe", "--driver", "echo", "--batch-size", "2"])
            .args(["--batches", "10"])
            .arg("--image_dir")
            .arg(&images)
            .arg("--output_dir")
            .arg(&outputs)
            .arg("--state_file")
            .arg(&state)
            .arg("--output_file")
            .arg(&transcript);
        c
    };

    transcribe().assert().success();
    assert_eq!(file_names(&outputs), ["batch_00001.txt", "batch_00003.txt"]);
    let processed = fs::read_to_string(&state).unwrap();
    assert_eq!(
        processed.lines().collect::<Vec<_>>(),
        ["00001.png", "00002.png", "00003.png"]
    );
    let log = fs::read_to_string(&transcript).unwrap();
    assert_eq!(log.matches("File: batch_").count(), 2);

    // Running again changes nothing.
    transcribe()
        .assert()
        .success()
        .stderr(predicate::str::contains("Nothing left to transcribe"));
    assert_eq!(file_names(&outputs), ["batch_00001.txt", "batch_00003.txt"]);
    assert_eq!(fs::read_to_string(&state).unwrap(), processed);

    let csv_path = dir.path().join("consolidated_output.csv");
    cmd()
        .current_dir(dir.path())
        .arg("consolidate")
        .arg("--input_dir")
        .arg(&outputs)
        .assert()
        .success();

    let mut rdr = csv::Reader::from_path(&csv_path).unwrap();
    assert_eq!(
        rdr.headers().unwrap().iter().collect::<Vec<_>>(),
        ["image_url", "transcription", "translation"]
    );
    let rows = rdr.records().map(|r| r.unwrap()).collect::<Vec<_>>();
    assert_eq!(rows.len(), 3);
    for (n, row) in (1..=3).zip(&rows) {
        assert!(row[0].ends_with(&format!("{n:05}.png")), "bad url {:?}", &row[0]);
        assert!(row[1].starts_with("image/png image"));
        assert!(!row[2].is_empty());
    }
}

#[test]
#[ignore = "Needs GEMINI_API_KEY and network access"]
fn test_transcribe_gemini_live() {
    let key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .env("GEMINI_API_KEY", key)
        .args(["transcribe", "--batch-size", "2", "--max-identifier", "2"])
        .assert()
        .success();
    assert_eq!(file_names(&dir.path().join("outputs")), ["batch_00001.txt"]);
}
