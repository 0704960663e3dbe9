//! Per-request dispatch: request → Event → engine → response.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use fnhost_runtime::{Context, Event, QueryValue};
use tracing::warn;

use crate::AppState;

/// Longest response-body prefix copied into an audit record.
const AUDIT_PREVIEW_BYTES: usize = 256;

/// Fallback for every path that is not `/fn/{name}`.
pub(crate) async fn not_found() -> Response {
  plain_text(StatusCode::NOT_FOUND, "Not Found".to_string())
}

/// Handle one invocation request end to end.
pub(crate) async fn invoke_function(
  State(state): State<AppState>,
  Path(name): Path<String>,
  request: Request,
) -> Response {
  let spec = match state.store.load_spec(&name).await {
    Ok(spec) => spec,
    Err(e) => {
      return plain_text(StatusCode::NOT_FOUND, format!("Function not found: {e}"));
    }
  };

  let (parts, body) = request.into_parts();
  let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
    Ok(bytes) => bytes,
    Err(e) => {
      return plain_text(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}"));
    }
  };

  let event = build_event(
    parts.method.as_str(),
    &parts.uri,
    &parts.headers,
    &body_bytes,
  );
  let context = Context {
    function_name: spec.name.clone(),
  };

  let base_dir = state.store.function_dir(&name);
  let result = state
    .engine
    .invoke(&spec, &base_dir, event.clone(), context)
    .await;

  // Handler failure must never take the server down: every error becomes
  // a plain 500 body.
  let normalized = match result {
    Ok(response) => response,
    Err(e) => fnhost_runtime::Response {
      status: 500,
      headers: HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]),
      body: format!("Error: {e}").into_bytes(),
    },
  };

  if spec.logging {
    append_audit(&state, &name, &event, &normalized).await;
  }

  into_http(normalized)
}

/// Build the handler-visible event from the raw request parts.
fn build_event(method: &str, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Event {
  let mut query: HashMap<String, QueryValue> = HashMap::new();
  for (key, value) in url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes()) {
    match query.get_mut(key.as_ref()) {
      Some(existing) => existing.push(value.into_owned()),
      None => {
        query.insert(key.into_owned(), QueryValue::One(value.into_owned()));
      }
    }
  }

  let headers = headers
    .iter()
    .map(|(k, v)| {
      (
        k.as_str().to_string(),
        String::from_utf8_lossy(v.as_bytes()).into_owned(),
      )
    })
    .collect();

  Event {
    method: method.to_string(),
    path: uri.path().to_string(),
    query,
    headers,
    body: String::from_utf8_lossy(body).into_owned(),
  }
}

/// Emit one audit record; sink failures never affect the response.
async fn append_audit(
  state: &AppState,
  name: &str,
  event: &Event,
  response: &fnhost_runtime::Response,
) {
  let preview_len = response.body.len().min(AUDIT_PREVIEW_BYTES);
  let record = serde_json::json!({
    "request": event,
    "response": {
      "status": response.status,
      "headers": response.headers,
      "bodyPreview": String::from_utf8_lossy(&response.body[..preview_len]),
    },
  });
  if let Err(e) = state.store.append_audit(name, &record).await {
    warn!(function = %name, error = %e, "failed to append audit record");
  }
}

/// Write a normalized triple back as an HTTP response.
fn into_http(normalized: fnhost_runtime::Response) -> Response {
  let mut builder = Response::builder().status(normalized.status);
  for (key, value) in &normalized.headers {
    builder = builder.header(key, value);
  }
  builder = builder.header(header::CONTENT_LENGTH, normalized.body.len());
  match builder.body(Body::from(normalized.body)) {
    Ok(response) => response,
    // A handler can emit header names or status codes the wire rejects.
    Err(e) => plain_text(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")),
  }
}

fn plain_text(status: StatusCode, body: String) -> Response {
  (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
