//! Result normalization.
//!
//! Handlers return heterogeneous shapes; [`normalize`] maps every one of
//! them to the canonical (status, headers, body) triple. The precedence
//! order is a contract handler authors rely on:
//!
//! 1. an explicit (status, headers, body) triple is returned directly;
//! 2. an object with `statusCode` is a Lambda-style response;
//! 3. any other object becomes a JSON body with status 200;
//! 4. raw bytes become an `application/octet-stream` body;
//! 5. a string becomes a `text/plain` body;
//! 6. everything else is rendered textually with status 200.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RuntimeError;

const CONTENT_TYPE: &str = "Content-Type";

/// A handler's raw return value, as produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerValue {
  /// An explicit (status, headers, body) triple.
  Triple(u16, HashMap<String, String>, Vec<u8>),
  /// Any JSON-shaped value: object, array, string, number, bool, null.
  Json(Value),
  /// A non-UTF-8 byte string.
  Bytes(Vec<u8>),
}

/// The canonical invocation result every backend must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  fn plain_text(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: HashMap::from([(CONTENT_TYPE.to_string(), "text/plain".to_string())]),
      body: body.into(),
    }
  }
}

/// Map a handler's raw return value to the canonical triple.
pub fn normalize(value: HandlerValue) -> Result<Response, RuntimeError> {
  match value {
    HandlerValue::Triple(status, headers, body) => Ok(Response {
      status,
      headers,
      body,
    }),
    HandlerValue::Json(Value::Object(map)) => {
      if map.contains_key("statusCode") {
        normalize_status_object(map)
      } else {
        // Plain payload object: the whole thing is the JSON body.
        let body = serde_json::to_vec(&Value::Object(map)).map_err(|e| {
          RuntimeError::HandlerFailed {
            message: format!("result is not serializable: {e}"),
          }
        })?;
        Ok(Response {
          status: 200,
          headers: HashMap::from([(
            CONTENT_TYPE.to_string(),
            "application/json".to_string(),
          )]),
          body,
        })
      }
    }
    HandlerValue::Bytes(bytes) => Ok(Response {
      status: 200,
      headers: HashMap::from([(
        CONTENT_TYPE.to_string(),
        "application/octet-stream".to_string(),
      )]),
      body: bytes,
    }),
    HandlerValue::Json(Value::String(text)) => Ok(Response::plain_text(200, text.into_bytes())),
    // Null, numbers, bools, and arrays fall through to their textual form.
    HandlerValue::Json(other) => Ok(Response::plain_text(200, other.to_string().into_bytes())),
  }
}

/// Normalize a Lambda-style `{statusCode, headers, body}` object.
fn normalize_status_object(
  map: serde_json::Map<String, Value>,
) -> Result<Response, RuntimeError> {
  let status = coerce_status(map.get("statusCode").unwrap_or(&Value::Null))?;

  let mut headers: HashMap<String, String> = match map.get("headers") {
    Some(Value::Object(hdrs)) => hdrs
      .iter()
      .map(|(k, v)| (k.clone(), header_value_text(v)))
      .collect(),
    Some(Value::Null) | None => HashMap::new(),
    Some(other) => {
      return Err(RuntimeError::HandlerFailed {
        message: format!("headers must be an object, got {other}"),
      });
    }
  };

  let body = match map.get("body") {
    Some(structured @ (Value::Object(_) | Value::Array(_))) => {
      // Structured bodies get a JSON content type unless the handler
      // supplied its own.
      headers
        .entry(CONTENT_TYPE.to_string())
        .or_insert_with(|| "application/json".to_string());
      serde_json::to_vec(structured).map_err(|e| RuntimeError::HandlerFailed {
        message: format!("body is not serializable: {e}"),
      })?
    }
    Some(Value::String(text)) => text.clone().into_bytes(),
    Some(Value::Null) | None => Vec::new(),
    Some(other) => other.to_string().into_bytes(),
  };

  Ok(Response {
    status,
    headers,
    body,
  })
}

fn coerce_status(value: &Value) -> Result<u16, RuntimeError> {
  let invalid = || RuntimeError::HandlerFailed {
    message: format!("statusCode is not a valid status: {value}"),
  };
  match value {
    Value::Number(n) => n
      .as_i64()
      .and_then(|i| u16::try_from(i).ok())
      .ok_or_else(invalid),
    Value::String(s) => s.parse::<u16>().map_err(|_| invalid()),
    _ => Err(invalid()),
  }
}

fn header_value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
