//! Handler caching for the in-process backend.
//!
//! Loaded Lua chunks are cached per artifact path together with the file's
//! modification timestamp. An entry is valid only while the stored
//! timestamp equals the file's current one; a stale entry is reloaded under
//! the write lock and replaced. Reads of a valid entry do not block each
//! other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use mlua::{Function, Lua};

use crate::error::RuntimeError;

/// A loaded handler artifact: the executed Lua state and the artifact
/// mtime it was loaded from.
pub(crate) struct CachedChunk {
  pub mtime: SystemTime,
  pub lua: Lua,
}

/// Caches loaded Lua states keyed by absolute artifact path.
///
/// Granularity is per artifact, not per function: two functions whose
/// entrypoints name the same file share one entry, and each resolves its
/// own symbol from the state's globals at call time.
#[derive(Clone, Default)]
pub struct HandlerCache {
  inner: Arc<RwLock<HashMap<PathBuf, Arc<CachedChunk>>>>,
}

impl HandlerCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get the cached state for an artifact, (re)loading it if the file has
  /// changed since it was cached.
  ///
  /// Load failures do not mutate the cache: the request fails and any
  /// prior entry for the path stays as it was. That includes a fresh load
  /// whose state does not define `symbol`. An already-cached state is
  /// returned without a symbol check, since artifacts are shared and each
  /// caller resolves its own symbol at call time.
  pub(crate) fn get_or_load(
    &self,
    path: &Path,
    symbol: &str,
  ) -> Result<Arc<CachedChunk>, RuntimeError> {
    let mtime = artifact_mtime(path)?;

    {
      let cache = self.inner.read().expect("handler cache poisoned");
      if let Some(entry) = cache.get(path)
        && entry.mtime == mtime
      {
        return Ok(entry.clone());
      }
    }

    let mut cache = self.inner.write().expect("handler cache poisoned");
    // Re-check under the write lock so concurrent misses load once.
    if let Some(entry) = cache.get(path)
      && entry.mtime == mtime
    {
      return Ok(entry.clone());
    }

    let entry = Arc::new(load_chunk(path, mtime)?);
    if entry.lua.globals().get::<Function>(symbol).is_err() {
      return Err(RuntimeError::HandlerLoad {
        message: format!("artifact does not define a function '{symbol}'"),
      });
    }
    cache.insert(path.to_path_buf(), entry.clone());
    Ok(entry)
  }

  /// Number of cached artifacts.
  pub fn len(&self) -> usize {
    self.inner.read().expect("handler cache poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop all cached states.
  pub fn clear(&self) {
    self.inner.write().expect("handler cache poisoned").clear();
  }
}

fn artifact_mtime(path: &Path) -> Result<SystemTime, RuntimeError> {
  let metadata = std::fs::metadata(path).map_err(|e| RuntimeError::HandlerLoad {
    message: format!("cannot stat artifact {}: {}", path.display(), e),
  })?;
  metadata.modified().map_err(|e| RuntimeError::HandlerLoad {
    message: format!("cannot read mtime of {}: {}", path.display(), e),
  })
}

/// Execute an artifact in a fresh Lua state.
fn load_chunk(path: &Path, mtime: SystemTime) -> Result<CachedChunk, RuntimeError> {
  let source = std::fs::read_to_string(path).map_err(|e| RuntimeError::HandlerLoad {
    message: format!("cannot read artifact {}: {}", path.display(), e),
  })?;

  let lua = Lua::new();
  lua
    .load(&source)
    .set_name(path.display().to_string())
    .exec()
    .map_err(|e| RuntimeError::HandlerLoad {
      message: format!("failed to load {}: {}", path.display(), e),
    })?;

  Ok(CachedChunk { mtime, lua })
}
