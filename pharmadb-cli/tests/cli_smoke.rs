use assert_cmd::Command;
use predicates::prelude::*;

fn pharmadb() -> Command {
    let mut cmd = Command::cargo_bin("pharmadb").unwrap();
    cmd.env_remove("DATABASE_URL").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    pharmadb()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn config_help_lists_subcommands() {
    pharmadb()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn set_requires_a_value() {
    pharmadb()
        .args(["config", "set", "qa.retention_days"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<VALUE>"));
}

#[test]
fn unreadable_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "pool = \"not a table\"\n").unwrap();

    pharmadb()
        .arg("--config")
        .arg(&path)
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[test]
fn invalid_pool_override_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[pool]\nmax_connections = 0\n").unwrap();

    pharmadb()
        .arg("--config")
        .arg(&path)
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_connections"));
}

#[test]
fn dotenv_settings_apply_to_logging_and_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "RUST_LOG=debug\nPHARMADB_MAX_CONNECTIONS=0\n",
    )
    .unwrap();

    pharmadb()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("PHARMADB_MAX_CONNECTIONS")
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Loaded .env from"))
        .stderr(predicate::str::contains("max_connections"));
}
