//! CLI smoke tests that need no model backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config = format!(
        r#"
[corpus]
dir = "{root}/data"

[index]
path = "{root}/index/docqa.sqlite"
{extra}
"#,
        root = root.display(),
        extra = extra
    );
    let path = config_dir.join("docqa.toml");
    fs::write(&path, config).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(docqa_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn test_index_stats_on_fresh_install() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let output = run(&config, &["index", "stats"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Built at:   never"));
    assert!(stdout.contains("Entries:    0"));
    assert!(tmp.path().join("index/docqa.sqlite").exists());
}

#[test]
fn test_ask_without_embedding_provider_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let output = run(&config, &["ask", "What is the refund window?"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("embedding provider is disabled"));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "\n[embedding]\nprovider = \"magic\"\n");

    let output = run(&config, &["index", "stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let output = run(&tmp.path().join("nope.toml"), &["index", "stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"));
}
