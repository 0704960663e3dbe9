//! Function specification types.

use serde::{Deserialize, Serialize};

/// The execution backend declared by a function.
///
/// Unknown tags are preserved in `Other` instead of failing deserialization,
/// so the invocation engine can report an unsupported backend for the
/// specific tag it saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  /// In-process Lua handler, loaded from the function directory.
  Lua,
  /// External process exchanging a JSON envelope over stdio.
  Exec,
  #[serde(untagged)]
  Other(String),
}

impl std::fmt::Display for Language {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Language::Lua => write!(f, "lua"),
      Language::Exec => write!(f, "exec"),
      Language::Other(tag) => write!(f, "{tag}"),
    }
  }
}

/// The command an `exec` function runs.
///
/// A bare string is run through `sh -c`; an argv array is spawned directly
/// without involving a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
  Shell(String),
  Argv(Vec<String>),
}

/// Stored description of one function.
///
/// Exactly one of `entrypoint` / `command` is meaningful, selected by
/// `language`. [`FunctionSpec::validate`] enforces that the field required
/// by the declared backend is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
  pub name: String,
  pub language: Language,
  /// `"file.lua:symbol"` reference for lua functions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entrypoint: Option<String>,
  /// Command for exec functions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<Command>,
  /// Whether invocations are appended to the audit log.
  #[serde(default = "default_logging")]
  pub logging: bool,
}

fn default_logging() -> bool {
  true
}

impl FunctionSpec {
  /// Check that the field required by the declared backend is present and
  /// well formed. Returns the failure message, if any.
  pub fn validate(&self) -> Result<(), String> {
    match &self.language {
      Language::Lua => match &self.entrypoint {
        Some(e) if !e.trim().is_empty() => Ok(()),
        _ => Err("lua function missing entrypoint".to_string()),
      },
      Language::Exec => match &self.command {
        Some(Command::Shell(s)) if !s.trim().is_empty() => Ok(()),
        Some(Command::Argv(v)) if !v.is_empty() => Ok(()),
        Some(_) => Err("exec function has an empty command".to_string()),
        None => Err("exec function missing command".to_string()),
      },
      // Unknown backends are rejected later by the engine, not here, so a
      // spec written by a newer version still loads and lists.
      Language::Other(_) => Ok(()),
    }
  }
}
