//! Binary smoke tests.

use assert_cmd::Command;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "tables": [{
        "name": "RefEtat",
        "collection_id": "db-etat",
        "title_column": "Nom",
        "fingerprint": ["Nom"]
    }]
}"#;

fn sheetsync() -> Command {
    let mut cmd = Command::cargo_bin("sheetsync").unwrap();
    cmd.env_remove("SHEETSYNC_CONFIG")
        .env_remove("NOTION_TOKEN")
        .env_remove("GOOGLE_SHEETS_TOKEN")
        .env_remove("GOOGLE_SHEET_ID")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

#[test]
fn test_version() {
    let output = sheetsync().args(["version", "--json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["notion_api"], "2022-06-28");
}

#[test]
fn test_missing_config_exits_2() {
    let dir = TempDir::new().unwrap();
    let output = sheetsync()
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .args(["check", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["error"]["code"], "CONFIG_NOT_FOUND");
}

#[test]
fn test_missing_credentials_exit_2() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let output = sheetsync()
        .arg("--config")
        .arg(&path)
        .args(["run", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["error"]["code"], "MISSING_ENV");
}

#[test]
fn test_check_lists_tables() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let output = sheetsync()
        .arg("--config")
        .arg(&path)
        .args(["check", "--json"])
        .env("NOTION_TOKEN", "secret_x")
        .env("GOOGLE_SHEETS_TOKEN", "ya29.x")
        .env("GOOGLE_SHEET_ID", "sheet-1")
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["spreadsheet_id"], "sheet-1");
    assert_eq!(json["tables"][0]["name"], "RefEtat");
    assert_eq!(json["tables"][0]["collection_id"], "db-etat");
}

#[test]
fn test_config_from_env_var() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let output = sheetsync()
        .env("SHEETSYNC_CONFIG", &path)
        .env("NOTION_TOKEN", "secret_x")
        .env("GOOGLE_SHEETS_TOKEN", "ya29.x")
        .env("GOOGLE_SHEET_ID", "sheet-1")
        .args(["check", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
}
