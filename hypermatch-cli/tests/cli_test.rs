use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::{tempdir, TempDir};

fn create_test_files(dir: &TempDir, files: &[(&str, &str)]) -> Result<()> {
    for (name, content) in files {
        fs::write(dir.path().join(name), content)?;
    }
    Ok(())
}

fn hypermatch(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("hypermatch")?;
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    Ok(cmd)
}

#[test]
fn test_scan_reports_matches_per_file() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("a.txt", "corpus"), ("b.txt", "nothing here")])?;

    hypermatch(&dir)?
        .args(["scan", "-p", "/cOrPuS/i", "-p", "/pus/i", "a.txt", "b.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt: cOrPuS, pus"))
        .stdout(predicate::str::contains("b.txt: no matches"));
    Ok(())
}

#[test]
fn test_scan_with_pattern_file() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(
        &dir,
        &[
            ("patterns.txt", "# anchors\n/^corpus$/\n\n/absent/\n"),
            ("a.txt", "corpus"),
        ],
    )?;

    hypermatch(&dir)?
        .args(["scan", "-f", "patterns.txt", "-j", "2", "a.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt: ^corpus$"));
    Ok(())
}

#[test]
fn test_vectored_scan_spans_files() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("a.txt", "cor"), ("b.txt", "pus")])?;

    hypermatch(&dir)?
        .args(["scan", "--vectored", "-p", "/corpus/", "a.txt", "b.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(vectored): corpus"));
    Ok(())
}

#[test]
fn test_scan_missing_file_fails() -> Result<()> {
    let dir = tempdir()?;

    hypermatch(&dir)?
        .args(["scan", "-p", "/corpus/", "missing.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
    Ok(())
}

#[test]
fn test_check_counts_patterns() -> Result<()> {
    let dir = tempdir()?;

    hypermatch(&dir)?
        .args(["check", "-p", "/a/", "-p", "/b/i", "-p", "3:/c/s"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 patterns compiled"));
    Ok(())
}

#[test]
fn test_check_reports_invalid_pattern() -> Result<()> {
    let dir = tempdir()?;

    hypermatch(&dir)?
        .args(["check", "-p", "/ok/", "-p", "/pattern/c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid pattern"))
        .stderr(predicate::str::contains("unknown flag `c`"));
    Ok(())
}

#[test]
fn test_check_without_patterns_fails() -> Result<()> {
    let dir = tempdir()?;

    hypermatch(&dir)?
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no patterns specified"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let dir = tempdir()?;

    hypermatch(&dir)?
        .args(["--config", "absent.yaml", "check", "-p", "/a/"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_config_file_is_read() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(&dir, &[("engine.yaml", "workers: 1\n"), ("a.txt", "corpus")])?;

    hypermatch(&dir)?
        .args(["--config", "engine.yaml", "scan", "-p", "/corpus/", "a.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt: corpus"));
    Ok(())
}
