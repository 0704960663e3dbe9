//! fnhost Runtime
//!
//! This crate is the function invocation runtime: given a function's spec
//! and an inbound [`Event`], it executes the handler and produces a
//! normalized HTTP [`Response`].
//!
//! Two backends are supported:
//! - [`lua`]: handlers loaded from Lua source in the function directory,
//!   cached per artifact path and reloaded when the file changes.
//! - [`process`]: handlers run as a child process, exchanging a JSON
//!   envelope over stdio under a wall-clock timeout.
//!
//! Both backends return a [`HandlerValue`], which [`normalize`] maps to the
//! canonical (status, headers, body) triple. The [`Engine`] ties it all
//! together, dispatching on the spec's declared language.

mod cache;
mod engine;
mod error;
mod event;
mod lua;
mod normalize;
mod process;

pub use cache::HandlerCache;
pub use engine::{DEFAULT_EXEC_TIMEOUT, Engine};
pub use error::RuntimeError;
pub use event::{Context, Event, QueryValue};
pub use normalize::{HandlerValue, Response, normalize};
