//! Runtime error types.

/// Errors that can occur while invoking a function.
///
/// A child process exiting non-zero is deliberately NOT represented here:
/// the process backend turns it into a normal 500 response instead of an
/// error.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The entrypoint reference could not be split into (file, symbol).
  #[error("invalid entrypoint: {message}")]
  InvalidEntrypoint { message: String },

  /// Handler code failed to load (missing file, syntax error, missing
  /// symbol, or a command that could not be spawned).
  #[error("failed to load handler: {message}")]
  HandlerLoad { message: String },

  /// Handler code raised an error during execution.
  #[error("handler failed: {message}")]
  HandlerFailed { message: String },

  /// The external process exceeded its wall-clock budget.
  #[error("process exceeded {timeout_secs}s timeout")]
  Timeout { timeout_secs: u64 },

  /// The spec declares a language no backend handles.
  #[error("unsupported language: {language}")]
  UnsupportedLanguage { language: String },

  /// The {event, context} envelope could not be serialized.
  #[error("failed to serialize invocation envelope: {message}")]
  EnvelopeSerialization { message: String },
}
