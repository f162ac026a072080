use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENV_VARS: &[&str] = &[
    "OVERLAP_SERVER_URL",
    "OVERLAP_TEAM_TOKEN",
    "OVERLAP_USER_TOKEN",
    "OVERLAP_DEBUG_LOG",
    "RUST_LOG",
    "CLAUDE_CODE_REMOTE",
    "SSH_CLIENT",
    "SSH_TTY",
];

fn overlap_hook(home: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_overlap-hook"));
    for var in ENV_VARS {
        command.env_remove(var);
    }
    command.env("OVERLAP_HOME", home);
    command
}

fn run_with_stdin(mut command: Command, stdin: &str) -> Output {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn garbage_input_still_exits_zero() {
    let home = tempdir().unwrap();
    let mut command = overlap_hook(home.path());
    command.arg("handle");

    let output = run_with_stdin(command, "{not json");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(text(&output.stderr).contains("Failed to parse hook input"));
}

#[test]
fn empty_input_is_ignored() {
    let home = tempdir().unwrap();
    let mut command = overlap_hook(home.path());
    command.arg("handle");

    let output = run_with_stdin(command, "");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn unconfigured_session_start_prints_hint() {
    let home = tempdir().unwrap();
    let mut command = overlap_hook(home.path());
    command.arg("handle");
    let input = json!({
        "hook_event_name": "SessionStart",
        "session_id": "claude-1",
        "source": "startup",
        "cwd": home.path(),
    });

    let output = run_with_stdin(command, &input.to_string());

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(text(&output.stderr).contains("Not configured"));
}

#[test]
fn config_command_writes_config_file() {
    let home = tempdir().unwrap();

    let output = overlap_hook(home.path())
        .args([
            "config",
            "--server-url",
            "https://overlap.example",
            "--team-token",
            "team-abcd",
            "--user-token",
            "user-wxyz",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = text(&output.stdout);
    assert!(stdout.contains("Configured: yes"));
    assert!(stdout.contains("User token: ****wxyz"));

    let stored: Value =
        serde_json::from_str(&std::fs::read_to_string(home.path().join("config.json")).unwrap())
            .unwrap();
    assert_eq!(stored["server_url"], "https://overlap.example");
    assert_eq!(stored["team_token"], "team-abcd");
    assert_eq!(stored["user_token"], "user-wxyz");
}

#[test]
fn status_reports_unreachable_server_without_failing() {
    let home = tempdir().unwrap();

    let output = overlap_hook(home.path())
        .arg("status")
        .env("OVERLAP_SERVER_URL", "http://127.0.0.1:1")
        .env("OVERLAP_TEAM_TOKEN", "team")
        .env("OVERLAP_USER_TOKEN", "user")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = text(&output.stdout);
    assert!(stdout.contains("Current session: (none)"));
    assert!(stdout.contains("Server: unreachable"));
}

#[tokio::test(flavor = "multi_thread")]
async fn first_edit_registers_and_sends_heartbeat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions/start"))
        .and(header("Authorization", "Bearer user-token"))
        .and(header("X-Team-Token", "team-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"session_id": "srv-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions/srv-1/heartbeat"))
        .and(body_json(json!({"files": ["x.py"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    let work = tempdir().unwrap();
    let transcript = work.path().join("transcript.jsonl");
    std::fs::write(&transcript, "{}\n").unwrap();
    let cwd = work.path().to_string_lossy().into_owned();
    let input = json!({
        "hook_event_name": "PostToolUse",
        "session_id": "claude-1",
        "transcript_path": transcript,
        "cwd": cwd,
        "tool_name": "MultiEdit",
        "tool_input": {"edits": [{"file_path": format!("{}/x.py", cwd)}]}
    });

    let mut command = overlap_hook(home.path());
    command
        .arg("handle")
        .env("OVERLAP_SERVER_URL", server.uri())
        .env("OVERLAP_TEAM_TOKEN", "team-token")
        .env("OVERLAP_USER_TOKEN", "user-token");
    let output = tokio::task::spawn_blocking(move || run_with_stdin(command, &input.to_string()))
        .await
        .unwrap();

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    let session: Value =
        serde_json::from_str(&std::fs::read_to_string(home.path().join("session.json")).unwrap())
            .unwrap();
    assert_eq!(session["session_id"], "srv-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_heartbeat_is_reported_to_server_log() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions/srv-1/heartbeat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"received": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    std::fs::write(
        home.path().join("session.json"),
        json!({"session_id": "srv-1"}).to_string(),
    )
    .unwrap();
    let input = json!({
        "hook_event_name": "PostToolUse",
        "session_id": "claude-1",
        "cwd": "/work",
        "tool_name": "Edit",
        "tool_input": {"file_path": "/work/src/lib.rs"}
    });

    let mut command = overlap_hook(home.path());
    command
        .arg("handle")
        .env("OVERLAP_SERVER_URL", server.uri())
        .env("OVERLAP_TEAM_TOKEN", "team-token")
        .env("OVERLAP_USER_TOKEN", "user-token");
    let output = tokio::task::spawn_blocking(move || run_with_stdin(command, &input.to_string()))
        .await
        .unwrap();

    assert!(output.status.success());
    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|request| request.url.path() == "/api/v1/logs")
        .unwrap();
    let body: Value = serde_json::from_slice(&upload.body).unwrap();
    let logs = body["logs"].as_array().unwrap();
    assert!(logs
        .iter()
        .any(|entry| entry["level"] == "ERROR" && entry["message"] == "PostToolUse hook failed"));
}
