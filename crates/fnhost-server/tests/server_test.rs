//! End-to-end dispatcher tests driven through the router with `oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fnhost_runtime::Engine;
use fnhost_server::{AppState, router};
use fnhost_store::{FunctionSpec, FunctionStore, Language};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

const HELLO_TEMPLATE: &str = include_str!("../../../templates/handler.lua");

struct TestHost {
  app: Router,
  store: FunctionStore,
  // Keeps the data directory alive for the test's duration.
  _dir: tempfile::TempDir,
}

async fn test_host() -> TestHost {
  let dir = tempfile::tempdir().unwrap();
  let store = FunctionStore::new(dir.path());
  store.ensure_dirs().await.unwrap();
  let state = AppState::new(FunctionStore::new(dir.path()), Engine::new());
  TestHost {
    app: router(state),
    store,
    _dir: dir,
  }
}

async fn create_hello(store: &FunctionStore, logging: bool) {
  let spec = FunctionSpec {
    name: "hello".to_string(),
    language: Language::Lua,
    entrypoint: Some("handler.lua:handler".to_string()),
    command: None,
    logging,
  };
  store.write_spec(&spec).await.unwrap();
  std::fs::write(store.function_dir("hello").join("handler.lua"), HELLO_TEMPLATE).unwrap();
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
  response
    .into_body()
    .collect()
    .await
    .unwrap()
    .to_bytes()
    .to_vec()
}

#[tokio::test]
async fn default_handler_answers_get_with_json() {
  let host = test_host().await;
  create_hello(&host.store, false).await;

  let response = host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/hello?name=dev")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response
      .headers()
      .get("content-type")
      .map(|v| v.to_str().unwrap()),
    Some("application/json")
  );
  let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
  assert_eq!(body, serde_json::json!({"hello": "dev", "from": "hello"}));
}

#[tokio::test]
async fn default_handler_answers_post_with_text() {
  let host = test_host().await;
  create_hello(&host.store, false).await;

  let response = host
    .app
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/fn/hello")
        .body(Body::from("ignored"))
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(body_bytes(response).await, b"Handled POST on /fn/hello");
}

#[tokio::test]
async fn unknown_function_is_404_on_every_method() {
  for method in ["GET", "POST", "PUT", "DELETE"] {
    let host = test_host().await;
    let response = host
      .app
      .oneshot(
        Request::builder()
          .method(method)
          .uri("/fn/missing")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND, "method {method}");
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with("Function not found:"), "body was {body:?}");
  }
}

#[tokio::test]
async fn paths_outside_fn_are_plain_404() {
  let host = test_host().await;
  let response = host
    .app
    .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::NOT_FOUND);
  assert_eq!(body_bytes(response).await, b"Not Found");
}

#[tokio::test]
async fn handler_failure_becomes_a_500_error_body() {
  let host = test_host().await;
  let spec = FunctionSpec {
    name: "broken".to_string(),
    language: Language::Lua,
    entrypoint: Some("handler.lua:handler".to_string()),
    command: None,
    logging: false,
  };
  host.store.write_spec(&spec).await.unwrap();
  std::fs::write(
    host.store.function_dir("broken").join("handler.lua"),
    "function handler() error(\"nope\") end",
  )
  .unwrap();

  let response = host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/broken")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body = String::from_utf8(body_bytes(response).await).unwrap();
  assert!(body.starts_with("Error:"), "body was {body:?}");
  assert!(body.contains("nope"));
}

#[tokio::test]
async fn repeated_query_keys_reach_the_handler_as_a_list() {
  let host = test_host().await;
  let spec = FunctionSpec {
    name: "multi".to_string(),
    language: Language::Lua,
    entrypoint: Some("handler.lua:handler".to_string()),
    command: None,
    logging: false,
  };
  host.store.write_spec(&spec).await.unwrap();
  std::fs::write(
    host.store.function_dir("multi").join("handler.lua"),
    r#"
function handler(event)
  return { tags = event.query.tag, single = event.query.solo }
end
"#,
  )
  .unwrap();

  let response = host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/multi?tag=a&tag=b&solo=x")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
  assert_eq!(body["tags"], serde_json::json!(["a", "b"]));
  assert_eq!(body["single"], "x");
}

#[tokio::test]
async fn audit_record_is_written_when_logging_is_enabled() {
  let host = test_host().await;
  create_hello(&host.store, true).await;

  let response = host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/hello?name=audit")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let log = std::fs::read_to_string(host.store.log_path("hello")).unwrap();
  let record: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
  assert_eq!(record["request"]["method"], "GET");
  assert_eq!(record["request"]["query"]["name"], "audit");
  assert_eq!(record["response"]["status"], 200);
  assert!(
    record["response"]["bodyPreview"]
      .as_str()
      .unwrap()
      .contains("audit")
  );
}

#[tokio::test]
async fn no_audit_record_when_logging_is_disabled() {
  let host = test_host().await;
  create_hello(&host.store, false).await;

  host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/hello")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  assert!(!host.store.log_path("hello").exists());
}

#[tokio::test]
async fn invalid_spec_is_reported_as_404() {
  let host = test_host().await;
  let path = host.store.spec_path("half");
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(&path, r#"{"name":"half","language":"lua"}"#).unwrap();

  let response = host
    .app
    .oneshot(Request::builder().uri("/fn/half").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::NOT_FOUND);
  let body = String::from_utf8(body_bytes(response).await).unwrap();
  assert!(body.contains("missing entrypoint"), "body was {body:?}");
}

#[tokio::test]
async fn response_includes_content_length() {
  let host = test_host().await;
  create_hello(&host.store, false).await;

  let response = host
    .app
    .oneshot(
      Request::builder()
        .uri("/fn/hello")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  let length: usize = response
    .headers()
    .get("content-length")
    .expect("content-length present")
    .to_str()
    .unwrap()
    .parse()
    .unwrap();
  assert_eq!(length, body_bytes(response).await.len());
}
