//! Integration tests for the external-process backend. These spawn real
//! child processes via `sh`, so they are Unix-only like the default shell
//! templates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use fnhost_runtime::{Context, Engine, Event, RuntimeError};
use fnhost_store::{Command, FunctionSpec, Language};

fn exec_spec(name: &str, command: Command) -> FunctionSpec {
  FunctionSpec {
    name: name.to_string(),
    language: Language::Exec,
    entrypoint: None,
    command: Some(command),
    logging: false,
  }
}

fn shell(line: &str) -> Command {
  Command::Shell(line.to_string())
}

fn post_event(body: &str) -> Event {
  Event {
    method: "POST".to_string(),
    path: "/fn/x".to_string(),
    query: HashMap::new(),
    headers: HashMap::new(),
    body: body.to_string(),
  }
}

fn context(name: &str) -> Context {
  Context {
    function_name: name.to_string(),
  }
}

#[tokio::test]
async fn json_stdout_is_normalized() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  let spec = exec_spec(
    "ok",
    shell(r#"echo '{"statusCode":201,"body":{"a":1}}'"#),
  );

  let response = engine
    .invoke(&spec, dir.path(), post_event(""), context("ok"))
    .await
    .unwrap();

  assert_eq!(response.status, 201);
  assert_eq!(
    response.headers.get("Content-Type").map(String::as_str),
    Some("application/json")
  );
  let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
  assert_eq!(body, serde_json::json!({"a": 1}));
}

#[tokio::test]
async fn nonzero_exit_becomes_a_500_with_stderr_body() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  let spec = exec_spec("boom", shell("printf boom 1>&2; exit 1"));

  // This is a normal result of the invocation, not a RuntimeError.
  let response = engine
    .invoke(&spec, dir.path(), post_event(""), context("boom"))
    .await
    .unwrap();

  assert_eq!(response.status, 500);
  assert_eq!(
    response.headers.get("Content-Type").map(String::as_str),
    Some("text/plain")
  );
  assert_eq!(response.body, b"Error: boom");
}

#[tokio::test]
async fn exchange_past_the_budget_times_out_and_kills_the_child() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::with_exec_timeout(Duration::from_millis(200));
  // A child that outlives the kill would write the marker after its sleep.
  let spec = exec_spec("slow", shell("sleep 1; echo alive > survived.txt"));

  let started = Instant::now();
  let err = engine
    .invoke(&spec, dir.path(), post_event(""), context("slow"))
    .await
    .unwrap_err();

  assert!(matches!(err, RuntimeError::Timeout { .. }));
  // The call must return at the budget, not when `sleep` would finish.
  assert!(started.elapsed() < Duration::from_secs(5));

  // Killed at the budget, the child never reaches the marker write.
  tokio::time::sleep(Duration::from_millis(1500)).await;
  assert!(!dir.path().join("survived.txt").exists());
}

#[tokio::test]
async fn timeout_covers_a_stdin_payload_the_child_never_reads() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::with_exec_timeout(Duration::from_millis(200));
  // `sleep` never reads stdin, and the envelope is far larger than an OS
  // pipe buffer, so the stdin write alone would block past the budget.
  let spec = exec_spec("deaf", shell("sleep 30"));
  let body = "x".repeat(2 * 1024 * 1024);

  let started = Instant::now();
  let err = engine
    .invoke(&spec, dir.path(), post_event(&body), context("deaf"))
    .await
    .unwrap_err();

  assert!(matches!(err, RuntimeError::Timeout { .. }));
  assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn malformed_stdout_falls_back_to_plain_text() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  let spec = exec_spec("raw", shell("printf 'not json at all'"));

  let response = engine
    .invoke(&spec, dir.path(), post_event(""), context("raw"))
    .await
    .unwrap();

  assert_eq!(response.status, 200);
  assert_eq!(
    response.headers.get("Content-Type").map(String::as_str),
    Some("text/plain")
  );
  assert_eq!(response.body, b"not json at all");
}

#[tokio::test]
async fn child_receives_the_event_envelope_on_stdin() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  // `cat` echoes the envelope back; the whole object becomes a JSON body.
  let spec = exec_spec("echoer", shell("cat"));

  let response = engine
    .invoke(&spec, dir.path(), post_event("payload"), context("echoer"))
    .await
    .unwrap();

  assert_eq!(response.status, 200);
  let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
  assert_eq!(body["event"]["method"], "POST");
  assert_eq!(body["event"]["body"], "payload");
  assert_eq!(body["context"]["function"], "echoer");
}

#[tokio::test]
async fn child_runs_in_the_function_directory() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("data.txt"), "relative works").unwrap();

  let engine = Engine::new();
  let spec = exec_spec("cwd", shell("cat data.txt"));

  let response = engine
    .invoke(&spec, dir.path(), post_event(""), context("cwd"))
    .await
    .unwrap();

  assert_eq!(response.status, 200);
  assert_eq!(response.body, b"relative works");
}

#[tokio::test]
async fn argv_commands_spawn_without_a_shell() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  let spec = exec_spec(
    "argv",
    Command::Argv(vec!["printf".to_string(), "direct".to_string()]),
  );

  let response = engine
    .invoke(&spec, dir.path(), post_event(""), context("argv"))
    .await
    .unwrap();
  assert_eq!(response.body, b"direct");
}

#[tokio::test]
async fn unknown_language_is_an_unsupported_backend() {
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::new();
  let spec: FunctionSpec =
    serde_json::from_str(r#"{"name":"w","language":"wasm","entrypoint":"x:y"}"#).unwrap();

  let err = engine
    .invoke(&spec, dir.path(), post_event(""), context("w"))
    .await
    .unwrap_err();
  match err {
    RuntimeError::UnsupportedLanguage { language } => assert_eq!(language, "wasm"),
    other => panic!("expected UnsupportedLanguage, got {other:?}"),
  }
}
