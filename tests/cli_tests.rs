//! CLI integration tests

mod common;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary with config isolated under `config_home`
fn record_engine(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("record-engine").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("NO_COLOR", "1")
        .env_remove("RECORD_ENGINE_DEVICE")
        .env_remove("RECORD_ENGINE_HELPER")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_output() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("stream"))
        .stdout(predicate::str::contains("devices"))
        .stdout(predicate::str::contains("encoders"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_output() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("record-engine"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn record_help_lists_format_flags() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["record", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--encoder"))
        .stdout(predicate::str::contains("--sample-rate"))
        .stdout(predicate::str::contains("--duration"))
        .stdout(predicate::str::contains("--backend"));
}

#[test]
fn record_requires_output() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .arg("record")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--output"));
}

#[test]
fn unknown_encoder_is_usage_error() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    let out = home.path().join("take.mp3");
    record_engine(home.path())
        .args(["record", "-o"])
        .arg(&out)
        .args(["-e", "mp3"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mp3"));
    assert!(!out.exists());
}

#[test]
fn invalid_duration_is_usage_error() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["record", "-o", "take.wav", "-d", "soon"])
        .assert()
        .code(2);
}

#[test]
fn invalid_channel_count_is_usage_error() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["record", "-o", "take.wav", "-c", "6"])
        .assert()
        .code(2);
}

#[test]
fn invalid_backend_is_rejected() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["record", "-o", "take.wav", "-B", "pulse"])
        .assert()
        .code(2);
}

#[test]
fn encoders_table_for_helper() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["encoders", "-B", "helper"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aacLc"))
        .stdout(predicate::str::contains("pcm16bits"))
        .stdout(predicate::str::contains("yes"))
        .stdout(predicate::str::contains("no"));
}

#[test]
fn config_path_uses_xdg_home() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("record-engine"))
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_set_then_get() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();

    record_engine(home.path())
        .args(["config", "set", "encoder", "FLAC"])
        .assert()
        .success();
    record_engine(home.path())
        .args(["config", "get", "encoder"])
        .assert()
        .success()
        .stdout("flac\n");

    let file = home.path().join("record-engine").join("config.toml");
    let content = std::fs::read_to_string(file).unwrap();
    assert!(content.contains("encoder = \"flac\""));
}

#[test]
fn config_get_unset_key() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "get", "device"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn config_rejects_unknown_key() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "set", "api_key", "secret"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown key"));
}

#[test]
fn config_rejects_bad_value() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "set", "channels", "5"])
        .assert()
        .code(1);
}

#[test]
fn config_init_then_list() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "init"])
        .assert()
        .success();
    record_engine(home.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sample_rate"))
        .stdout(predicate::str::contains("helper_path"));
}

#[cfg(unix)]
#[test]
fn record_with_helper_backend() {
    let _guard = common::stub_lock();
    let stub = common::HelperStub::new();
    let home = tempfile::tempdir().unwrap();
    let out = stub.output_path("take.wav");

    record_engine(home.path())
        .env("RECORD_ENGINE_HELPER", &stub.path)
        .args(["record", "-B", "helper", "-d", "300ms", "-o"])
        .arg(&out)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("Saved"));

    assert!(common::file_len(&out).unwrap() > 0);
    let calls = stub.calls();
    assert!(calls.first().unwrap().contains("--record"));
    assert!(calls.last().unwrap().ends_with("--globcmd=quit"));
}

#[cfg(unix)]
#[test]
fn record_with_missing_helper_fails() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .env("RECORD_ENGINE_HELPER", home.path().join("absent"))
        .args(["record", "-B", "helper", "-d", "1s", "-o", "take.wav"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("helper not found"));
}

#[test]
fn helper_backend_from_config_file() {
    let _guard = common::stub_lock();
    let home = tempfile::tempdir().unwrap();
    record_engine(home.path())
        .args(["config", "set", "backend", "fmedia"])
        .assert()
        .success();
    record_engine(home.path())
        .args(["config", "get", "backend"])
        .assert()
        .success()
        .stdout("helper\n");
}
