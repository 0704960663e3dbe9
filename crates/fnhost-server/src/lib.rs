//! fnhost Server
//!
//! The HTTP boundary of the runtime: an axum router exposing
//! `GET|POST|PUT|DELETE /fn/{name}`. Each request is parsed into an
//! [`Event`](fnhost_runtime::Event) and dispatched through the invocation
//! engine; every failure becomes a plain-text error response, never a
//! dropped connection.

mod dispatch;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use fnhost_runtime::Engine;
use fnhost_store::FunctionStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the dispatcher.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<FunctionStore>,
  pub engine: Arc<Engine>,
}

impl AppState {
  pub fn new(store: FunctionStore, engine: Engine) -> Self {
    Self {
      store: Arc::new(store),
      engine: Arc::new(engine),
    }
  }
}

/// Build the dispatcher router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route(
      "/fn/{name}",
      get(dispatch::invoke_function)
        .post(dispatch::invoke_function)
        .put(dispatch::invoke_function)
        .delete(dispatch::invoke_function),
    )
    .fallback(dispatch::not_found)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Bind and run the server until it is shut down.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
  let listener = TcpListener::bind(addr).await?;
  info!("fnhost server listening on http://{}", listener.local_addr()?);
  axum::serve(listener, router(state)).await
}
