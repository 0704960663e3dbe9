//! Invocation engine.
//!
//! Single entry point over both backends: dispatch on the spec's declared
//! language, run the handler, and pipe the raw result through the
//! normalizer. Backend failures surface unchanged; nothing is retried.

use std::path::Path;
use std::time::Duration;

use fnhost_store::{FunctionSpec, Language};
use tracing::{error, info, instrument};

use crate::cache::HandlerCache;
use crate::error::RuntimeError;
use crate::event::{Context, Event};
use crate::lua::LuaBackend;
use crate::normalize::{Response, normalize};
use crate::process;

/// Wall-clock budget for an external-process exchange.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

/// Dispatches invocations to the backend a spec declares.
pub struct Engine {
  lua: LuaBackend,
  cache: HandlerCache,
  exec_timeout: Duration,
}

impl Engine {
  pub fn new() -> Self {
    Self::with_exec_timeout(DEFAULT_EXEC_TIMEOUT)
  }

  pub fn with_exec_timeout(exec_timeout: Duration) -> Self {
    let cache = HandlerCache::new();
    Self {
      lua: LuaBackend::new(cache.clone()),
      cache,
      exec_timeout,
    }
  }

  /// The in-process handler cache, shared across invocations.
  pub fn handler_cache(&self) -> &HandlerCache {
    &self.cache
  }

  /// Invoke a function and normalize its result.
  ///
  /// `base_dir` is the function's storage directory: lua entrypoints
  /// resolve against it and exec children run with it as their cwd.
  #[instrument(
    name = "invoke",
    skip(self, spec, base_dir, event, context),
    fields(
      function = %context.function_name,
      method = %event.method,
    )
  )]
  pub async fn invoke(
    &self,
    spec: &FunctionSpec,
    base_dir: &Path,
    event: Event,
    context: Context,
  ) -> Result<Response, RuntimeError> {
    info!(path = %event.path, "invocation started");

    let result = self.invoke_inner(spec, base_dir, &event, &context).await;

    match &result {
      Ok(response) => {
        info!(status = response.status, "invocation completed");
      }
      Err(e) => {
        error!(error = %e, "invocation failed");
      }
    }

    result
  }

  async fn invoke_inner(
    &self,
    spec: &FunctionSpec,
    base_dir: &Path,
    event: &Event,
    context: &Context,
  ) -> Result<Response, RuntimeError> {
    let raw = match &spec.language {
      Language::Lua => {
        let entrypoint =
          spec
            .entrypoint
            .as_deref()
            .ok_or_else(|| RuntimeError::InvalidEntrypoint {
              message: "lua function missing entrypoint".to_string(),
            })?;
        self.lua.invoke(base_dir, entrypoint, event, context).await?
      }
      Language::Exec => {
        let command = spec
          .command
          .as_ref()
          .ok_or_else(|| RuntimeError::HandlerLoad {
            message: "exec function missing command".to_string(),
          })?;
        process::invoke(command, base_dir, event, context, self.exec_timeout).await?
      }
      Language::Other(tag) => {
        return Err(RuntimeError::UnsupportedLanguage {
          language: tag.clone(),
        });
      }
    };

    normalize(raw)
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::new()
  }
}
