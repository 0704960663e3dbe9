//! Filesystem-backed function store.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::StoreError;
use crate::spec::FunctionSpec;

/// The on-disk config file inside each function directory.
const SPEC_FILE: &str = "fn.json";

/// Filesystem-based store for function specs and audit logs.
///
/// All paths hang off a single data directory. The store performs no
/// caching: every [`load_spec`](FunctionStore::load_spec) hits the disk so
/// edits are visible on the next invocation.
pub struct FunctionStore {
  data_dir: PathBuf,
}

impl FunctionStore {
  /// Create a store rooted at the given data directory.
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
    }
  }

  /// The root data directory.
  pub fn data_dir(&self) -> &Path {
    &self.data_dir
  }

  /// Directory containing one subdirectory per function.
  pub fn functions_dir(&self) -> PathBuf {
    self.data_dir.join("functions")
  }

  /// Directory containing one audit log file per function.
  pub fn logs_dir(&self) -> PathBuf {
    self.data_dir.join("logs")
  }

  /// Storage directory for a single function.
  pub fn function_dir(&self, name: &str) -> PathBuf {
    self.functions_dir().join(name)
  }

  /// Path of a function's spec file.
  pub fn spec_path(&self, name: &str) -> PathBuf {
    self.function_dir(name).join(SPEC_FILE)
  }

  /// Path of a function's audit log.
  pub fn log_path(&self, name: &str) -> PathBuf {
    self.logs_dir().join(format!("{name}.log"))
  }

  /// Create the functions and logs directories if they do not exist.
  pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
    fs::create_dir_all(self.functions_dir()).await?;
    fs::create_dir_all(self.logs_dir()).await?;
    Ok(())
  }

  /// Load a function's spec fresh from disk.
  ///
  /// Fails with [`StoreError::NotFound`] when no config exists for the name
  /// and [`StoreError::InvalidSpec`] when the config is missing the field
  /// its declared backend requires.
  pub async fn load_spec(&self, name: &str) -> Result<FunctionSpec, StoreError> {
    let path = self.spec_path(name);
    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(StoreError::NotFound(name.to_string()));
      }
      Err(e) => return Err(e.into()),
    };

    let spec: FunctionSpec =
      serde_json::from_str(&content).map_err(|e| StoreError::InvalidSpec {
        name: name.to_string(),
        message: e.to_string(),
      })?;

    spec.validate().map_err(|message| StoreError::InvalidSpec {
      name: name.to_string(),
      message,
    })?;

    Ok(spec)
  }

  /// Write a function's spec atomically (tmp file + rename).
  pub async fn write_spec(&self, spec: &FunctionSpec) -> Result<(), StoreError> {
    let path = self.spec_path(&spec.name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut content = serde_json::to_string_pretty(spec)?;
    content.push('\n');
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, &path).await?;
    Ok(())
  }

  /// List the specs of all functions in the store, sorted by name.
  ///
  /// Directories without a readable spec file are skipped rather than
  /// failing the whole listing.
  pub async fn list_specs(&self) -> Result<Vec<FunctionSpec>, StoreError> {
    let mut specs = Vec::new();
    let mut entries = match fs::read_dir(self.functions_dir()).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(specs),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      if !entry.path().is_dir() {
        continue;
      }
      let name = match entry.file_name().into_string() {
        Ok(name) => name,
        Err(_) => continue,
      };
      match self.load_spec(&name).await {
        Ok(spec) => specs.push(spec),
        Err(StoreError::NotFound(_)) => continue,
        Err(e) => {
          tracing::warn!(function = %name, error = %e, "skipping unreadable spec");
        }
      }
    }

    specs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(specs)
  }

  /// Delete a function's directory, and optionally its audit log.
  pub async fn remove_function(&self, name: &str, purge_logs: bool) -> Result<(), StoreError> {
    let dir = self.function_dir(name);
    match fs::remove_dir_all(&dir).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(StoreError::NotFound(name.to_string()));
      }
      Err(e) => return Err(e.into()),
    }
    if purge_logs {
      match fs::remove_file(self.log_path(name)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }

  /// Append one audit record to a function's log as a single JSON line.
  pub async fn append_audit(
    &self,
    name: &str,
    record: &serde_json::Value,
  ) -> Result<(), StoreError> {
    let path = self.log_path(name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
  }
}
