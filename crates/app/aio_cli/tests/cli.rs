use assert_cmd::Command;
use predicates::prelude::*;

fn aio() -> Command {
    Command::cargo_bin("aio").unwrap()
}

#[test]
fn version_prints_package_version() {
    aio()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_session_commands() {
    aio()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("login")
                .and(predicate::str::contains("whoami"))
                .and(predicate::str::contains("fetch")),
        );
}

#[test]
fn whoami_without_token_fails() {
    let dir = tempfile::tempdir().unwrap();
    aio()
        .args(["whoami", "--base-url", "http://127.0.0.1:9", "--token-file"])
        .arg(dir.path().join("token"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn logout_without_server_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let token = dir.path().join("token");
    std::fs::write(&token, "stale").unwrap();

    aio()
        .args(["logout", "--base-url", "http://127.0.0.1:9", "--token-file"])
        .arg(&token)
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    assert!(!token.exists());
}

#[test]
fn fetch_rejects_bad_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let token = dir.path().join("token");
    std::fs::write(&token, "x").unwrap();

    aio()
        .args(["fetch", "/api/auth/me", "-d", "{not json", "--token-file"])
        .arg(&token)
        .assert()
        .failure();
}

#[test]
fn fetch_refuses_other_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let token = dir.path().join("token");
    std::fs::write(&token, "x").unwrap();

    aio()
        .args(["fetch", "//evil.example/steal", "--base-url", "http://127.0.0.1:9"])
        .arg("--token-file")
        .arg(&token)
        .assert()
        .failure()
        .stderr(predicate::str::contains("foreign origin"));
    assert!(token.exists());
}
