//! In-process Lua backend.
//!
//! Handlers are plain Lua files that define a global function, referenced
//! from the spec as `"file.lua:symbol"`. The artifact is executed once per
//! change (see [`HandlerCache`]) and the symbol is called with
//! `(event, context)` tables. Handler execution is synchronous Lua, so the
//! call runs on the blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mlua::{Function, Lua, LuaSerdeExt, MultiValue, Value};

use crate::cache::HandlerCache;
use crate::error::RuntimeError;
use crate::event::{Context, Event};
use crate::normalize::HandlerValue;

pub(crate) struct LuaBackend {
  cache: HandlerCache,
}

impl LuaBackend {
  pub fn new(cache: HandlerCache) -> Self {
    Self { cache }
  }

  /// Invoke a Lua handler, loading or reusing its artifact as needed.
  pub async fn invoke(
    &self,
    base_dir: &Path,
    entrypoint: &str,
    event: &Event,
    context: &Context,
  ) -> Result<HandlerValue, RuntimeError> {
    let (path, symbol) = resolve_entrypoint(base_dir, entrypoint)?;

    let cache = self.cache.clone();
    let event = event.clone();
    let context = context.clone();
    tokio::task::spawn_blocking(move || {
      let entry = cache.get_or_load(&path, &symbol)?;
      call_handler(&entry.lua, &symbol, &event, &context)
    })
    .await
    .map_err(|e| RuntimeError::HandlerFailed {
      message: format!("handler task panicked: {e}"),
    })?
  }
}

/// Split an entrypoint reference into (artifact path, symbol name).
///
/// A file part without a `.lua` suffix is tolerated when the suffixed file
/// exists, so `"handler:handler"` resolves to `handler.lua`.
fn resolve_entrypoint(base_dir: &Path, entrypoint: &str) -> Result<(PathBuf, String), RuntimeError> {
  let Some((file, symbol)) = entrypoint.split_once(':') else {
    return Err(RuntimeError::InvalidEntrypoint {
      message: format!("expected 'file.lua:handler', got '{entrypoint}'"),
    });
  };
  if file.is_empty() || symbol.is_empty() {
    return Err(RuntimeError::InvalidEntrypoint {
      message: format!("expected 'file.lua:handler', got '{entrypoint}'"),
    });
  }

  let mut path = base_dir.join(file);
  if path.extension().is_none_or(|ext| ext != "lua") && !path.exists() {
    let with_ext = path.with_extension("lua");
    if with_ext.exists() {
      path = with_ext;
    }
  }

  Ok((path, symbol.to_string()))
}

/// Call the named global with (event, context) and convert its results.
fn call_handler(
  lua: &Lua,
  symbol: &str,
  event: &Event,
  context: &Context,
) -> Result<HandlerValue, RuntimeError> {
  let handler: Function = lua
    .globals()
    .get(symbol)
    .map_err(|_| RuntimeError::HandlerLoad {
      message: format!("artifact does not define a function '{symbol}'"),
    })?;

  let event_value = lua
    .to_value(event)
    .map_err(|e| RuntimeError::EnvelopeSerialization {
      message: e.to_string(),
    })?;
  let context_value = lua
    .to_value(context)
    .map_err(|e| RuntimeError::EnvelopeSerialization {
      message: e.to_string(),
    })?;

  let results = handler
    .call::<MultiValue>((event_value, context_value))
    .map_err(|e| RuntimeError::HandlerFailed {
      message: e.to_string(),
    })?;

  let mut values: Vec<Value> = results.into_iter().collect();
  if values.len() == 3 {
    let body = values.pop().unwrap_or(Value::Nil);
    let headers = values.pop().unwrap_or(Value::Nil);
    let status = values.pop().unwrap_or(Value::Nil);
    triple_from_lua(lua, status, headers, body)
  } else {
    single_value(lua, values.into_iter().next().unwrap_or(Value::Nil))
  }
}

/// Convert a 3-value return into an explicit triple.
fn triple_from_lua(
  lua: &Lua,
  status: Value,
  headers: Value,
  body: Value,
) -> Result<HandlerValue, RuntimeError> {
  let status = match status {
    Value::Integer(i) => u16::try_from(i).ok(),
    Value::Number(n) => u16::try_from(n as i64).ok(),
    _ => None,
  }
  .ok_or_else(|| RuntimeError::HandlerFailed {
    message: "triple status must be an integer".to_string(),
  })?;

  let headers: HashMap<String, String> = match headers {
    Value::Nil => HashMap::new(),
    table @ Value::Table(_) => {
      lua
        .from_value(table)
        .map_err(|e| RuntimeError::HandlerFailed {
          message: format!("triple headers must be a string map: {e}"),
        })?
    }
    _ => {
      return Err(RuntimeError::HandlerFailed {
        message: "triple headers must be a table".to_string(),
      });
    }
  };

  let body = match body {
    Value::Nil => Vec::new(),
    Value::String(s) => s.as_bytes().to_vec(),
    _ => {
      return Err(RuntimeError::HandlerFailed {
        message: "triple body must be a string".to_string(),
      });
    }
  };

  Ok(HandlerValue::Triple(status, headers, body))
}

/// Convert a single Lua return value into a [`HandlerValue`].
///
/// Lua strings are byte strings: valid UTF-8 flows on as text, anything
/// else is treated as raw bytes.
fn single_value(lua: &Lua, value: Value) -> Result<HandlerValue, RuntimeError> {
  match value {
    Value::Nil => Ok(HandlerValue::Json(serde_json::Value::Null)),
    Value::Boolean(b) => Ok(HandlerValue::Json(serde_json::Value::Bool(b))),
    Value::Integer(i) => Ok(HandlerValue::Json(serde_json::Value::from(i))),
    Value::Number(n) => Ok(HandlerValue::Json(serde_json::Value::from(n))),
    Value::String(s) => match s.to_str() {
      Ok(text) => Ok(HandlerValue::Json(serde_json::Value::String(
        text.to_string(),
      ))),
      Err(_) => Ok(HandlerValue::Bytes(s.as_bytes().to_vec())),
    },
    table @ Value::Table(_) => {
      lua
        .from_value(table)
        .map(HandlerValue::Json)
        .map_err(|e| RuntimeError::HandlerFailed {
          message: format!("result table is not JSON-shaped: {e}"),
        })
    }
    other => Ok(HandlerValue::Json(serde_json::Value::String(format!(
      "{other:?}"
    )))),
  }
}
