//! External-process backend.
//!
//! The function runs as a child process with its working directory set to
//! the function's own storage directory. It receives
//! `{"event": ..., "context": ...}` as a single JSON document on stdin and
//! answers on stdout. The whole exchange runs under a wall-clock timeout;
//! on expiry the child is killed.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use fnhost_store::Command;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::RuntimeError;
use crate::event::{Context, Event};
use crate::normalize::HandlerValue;

/// Run an exec function and map its exit into a [`HandlerValue`].
///
/// A non-zero exit is not an error: it yields a canonical 500 with the
/// child's stderr as the body. Only a timeout or a failure to spawn or
/// talk to the child surfaces as [`RuntimeError`].
pub(crate) async fn invoke(
  command: &Command,
  base_dir: &Path,
  event: &Event,
  context: &Context,
  timeout: Duration,
) -> Result<HandlerValue, RuntimeError> {
  let envelope = serde_json::to_string(&serde_json::json!({
    "event": event,
    "context": context,
  }))
  .map_err(|e| RuntimeError::EnvelopeSerialization {
    message: e.to_string(),
  })?;

  let mut cmd = match command {
    Command::Shell(line) => {
      let mut cmd = TokioCommand::new("sh");
      cmd.arg("-c").arg(line);
      cmd
    }
    Command::Argv(argv) => {
      let (program, args) = argv.split_first().ok_or_else(|| RuntimeError::HandlerLoad {
        message: "exec command is empty".to_string(),
      })?;
      let mut cmd = TokioCommand::new(program);
      cmd.args(args);
      cmd
    }
  };

  let mut child = cmd
    .current_dir(base_dir)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    // Dropping the wait future on timeout must reap the child.
    .kill_on_drop(true)
    .spawn()
    .map_err(|e| RuntimeError::HandlerLoad {
      message: format!("failed to spawn command: {e}"),
    })?;

  let stdin = child.stdin.take();
  let exchange = async {
    let feed = async {
      if let Some(mut stdin) = stdin {
        // The child may exit without reading its stdin; a broken pipe here
        // is not a failure of the invocation.
        let _ = stdin.write_all(envelope.as_bytes()).await;
        let _ = stdin.shutdown().await;
      }
    };
    // Feed stdin while collecting output, so a child that fills one pipe
    // before draining the other cannot wedge the exchange, and the budget
    // covers the write as well as the wait.
    let (_, output) = tokio::join!(feed, child.wait_with_output());
    output
  };

  let output = tokio::time::timeout(timeout, exchange)
    .await
    .map_err(|_| RuntimeError::Timeout {
      timeout_secs: timeout.as_secs(),
    })?
    .map_err(|e| RuntimeError::HandlerFailed {
      message: format!("failed to collect process output: {e}"),
    })?;

  debug!(status = ?output.status.code(), "process exited");

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let body = format!("Error: {stderr}").into_bytes();
    let headers = HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]);
    return Ok(HandlerValue::Triple(500, headers, body));
  }

  match serde_json::from_slice(&output.stdout) {
    Ok(value) => Ok(HandlerValue::Json(value)),
    // Non-JSON stdout degrades to a plain-text 200 body.
    Err(_) => {
      let headers = HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]);
      Ok(HandlerValue::Triple(200, headers, output.stdout))
    }
  }
}
