use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn vocab(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vocab").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path())
        .env("HOME", home.path())
        .arg("--no-tts");
    cmd
}

fn word_list(home: &TempDir) -> PathBuf {
    let path = home.path().join("animals.tsv");
    fs::write(&path, "cat\t猫\tkæt\ndog\t狗\n").unwrap();
    path
}

#[test]
fn test_help_flag() {
    let mut cmd = Command::cargo_bin("vocab").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--import-only"));
}

#[test]
fn test_import_only() {
    let home = TempDir::new().unwrap();
    let list = word_list(&home);

    vocab(&home)
        .arg("--import-only")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 / 2"))
        .stdout(predicate::str::contains("Imported animals.tsv: 2 entries"));

    assert!(home.path().join("vocab").join("words.db").exists());
    assert!(home.path().join("vocab").join("configuration.json").exists());
}

#[test]
fn test_second_import_is_skipped() {
    let home = TempDir::new().unwrap();
    let list = word_list(&home);

    vocab(&home).arg("--import-only").arg(&list).assert().success();
    vocab(&home)
        .arg("--import-only")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("already imported"));
}

#[test]
fn test_list_and_dump() {
    let home = TempDir::new().unwrap();
    let list = word_list(&home);
    vocab(&home).arg("--import-only").arg(&list).assert().success();

    vocab(&home)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::eq("animals.tsv\n"));

    vocab(&home)
        .args(["--dump", "animals.tsv"])
        .assert()
        .success()
        .stdout(predicate::eq("cat\t猫\tkæt\ndog\t狗\n"));
}

#[test]
fn test_dump_unknown_file() {
    let home = TempDir::new().unwrap();
    vocab(&home)
        .args(["--dump", "missing.tsv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No imported file named 'missing.tsv'"));
}

#[test]
fn test_db_flag_overrides_location() {
    let home = TempDir::new().unwrap();
    let list = word_list(&home);
    let db = home.path().join("elsewhere").join("custom.db");

    vocab(&home)
        .arg("--db")
        .arg(&db)
        .arg("--import-only")
        .arg(&list)
        .assert()
        .success();

    assert!(db.exists());
    assert!(!home.path().join("vocab").join("words.db").exists());
}

#[test]
fn test_import_missing_file_fails() {
    let home = TempDir::new().unwrap();
    vocab(&home)
        .arg("--import-only")
        .arg(home.path().join("nope.tsv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to import"));
}
