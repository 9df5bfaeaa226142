//! CLI integration tests: drive the `jpk` binary through `assert_cmd`
//! end to end, each test working against its own tempdir archive.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn jpk() -> Command {
    Command::cargo_bin("jpk").unwrap()
}

#[test]
fn create_then_list_shows_an_empty_archive() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("backup.jpk");

    jpk()
        .arg("create")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    jpk()
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Key"));
}

#[test]
fn create_twice_fails_with_already_exists() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("backup.jpk");

    jpk().arg("create").arg(&archive).assert().success();
    jpk().arg("create").arg(&archive).assert().failure().code(3);
}

#[test]
fn add_then_list_shows_the_added_file() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("backup.jpk");
    let file = dir.path().join("note.txt");
    fs::write(&file, b"hello from the cli test").unwrap();

    jpk().arg("create").arg(&archive).assert().success();
    jpk()
        .arg("add")
        .arg(&archive)
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("added 1 entries"));

    jpk()
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("note.txt"));
}

#[test]
fn add_then_extract_roundtrips_file_contents() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("backup.jpk");
    let file = dir.path().join("note.txt");
    fs::write(&file, b"round trip me").unwrap();

    jpk().arg("create").arg(&archive).assert().success();
    jpk().arg("add").arg(&archive).arg(&file).assert().success();

    let out = dir.path().join("out");
    jpk()
        .arg("extract")
        .arg(&archive)
        .arg(&out)
        .assert()
        .success();

    assert_eq!(fs::read(out.join("note.txt")).unwrap(), b"round trip me");
}

#[test]
fn add_with_gzip_encrypt_hmac_then_extract_with_matching_key_succeeds() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("secret.jpk");
    let file = dir.path().join("secret.txt");
    fs::write(&file, b"top secret payload").unwrap();

    jpk().arg("create").arg(&archive).assert().success();
    jpk()
        .arg("add")
        .arg(&archive)
        .arg(&file)
        .arg("--gzip")
        .arg("--encrypt")
        .arg("--hmac")
        .arg("--encryption-key")
        .arg("hunter2")
        .assert()
        .success();

    let out = dir.path().join("out");
    jpk()
        .arg("extract")
        .arg(&archive)
        .arg(&out)
        .arg("--encryption-key")
        .arg("hunter2")
        .arg("--verify")
        .assert()
        .success();

    assert_eq!(fs::read(out.join("secret.txt")).unwrap(), b"top secret payload");
}

#[test]
fn list_with_wrong_encryption_key_fails() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("secret.jpk");
    let file = dir.path().join("secret.txt");
    fs::write(&file, b"top secret payload").unwrap();

    jpk().arg("create").arg(&archive).assert().success();
    jpk()
        .arg("add")
        .arg(&archive)
        .arg(&file)
        .arg("--encrypt")
        .arg("--hmac")
        .arg("--encryption-key")
        .arg("right-key")
        .assert()
        .success();

    let out = dir.path().join("out");
    jpk()
        .arg("extract")
        .arg(&archive)
        .arg(&out)
        .arg("--encryption-key")
        .arg("wrong-key")
        .arg("--verify")
        .assert()
        .failure()
        .code(4);
}

#[test]
fn extract_on_missing_archive_fails_not_found() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("nope.jpk");
    let out = dir.path().join("out");

    jpk()
        .arg("extract")
        .arg(&archive)
        .arg(&out)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn add_with_directories_flag_records_bare_directory_keys() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("dirs.jpk");

    jpk().arg("create").arg(&archive).assert().success();
    jpk()
        .arg("add")
        .arg(&archive)
        .arg("photos/2026")
        .arg("--directories")
        .assert()
        .success();

    jpk()
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("photos/2026"));
}

#[test]
fn list_headers_shows_version_headers() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("backup.jpk");
    let file = dir.path().join("note.txt");
    fs::write(&file, b"content").unwrap();

    jpk().arg("create").arg(&archive).assert().success();
    jpk().arg("add").arg(&archive).arg(&file).assert().success();

    jpk()
        .arg("list-headers")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("majorVersion"))
        .stdout(predicate::str::contains("minorVersion"));
}
