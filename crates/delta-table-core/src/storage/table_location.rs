use std::{fmt, path::Path, sync::Arc};

use snafu::OptionExt;

use crate::storage::{
    layout, InvalidLocationSnafu, LocalFileSystem, StorageBackend, StorageResult,
};

/// Table root location together with the backend that serves it.
///
/// The root is kept as a `/`-separated string without a trailing slash; all
/// paths handed to the backend are built with [`TableLocation::join`].
#[derive(Debug, Clone)]
pub struct TableLocation {
    root: String,
    backend: Arc<dyn StorageBackend>,
}

impl TableLocation {
    /// Creates a new `TableLocation` for a local filesystem path.
    pub fn local(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_string_lossy().into_owned();
        Self::new(root, Arc::new(LocalFileSystem::new()))
    }

    /// Bind an arbitrary root string to a caller-provided backend.
    pub fn new(root: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        TableLocation {
            root: normalize_root(root.into()),
            backend,
        }
    }

    /// Parse a user-facing table location string.
    ///
    /// Plain paths and `file://` URIs map to the local filesystem. Other
    /// schemes need an explicit backend via [`TableLocation::new`].
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return InvalidLocationSnafu {
                spec,
                reason: "empty location",
            }
            .fail();
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            if scheme != "file" {
                return InvalidLocationSnafu {
                    spec,
                    reason: format!("scheme {scheme:?} requires an explicit storage backend"),
                }
                .fail();
            }
            let path = layout::file_uri_path(trimmed).context(InvalidLocationSnafu {
                spec,
                reason: "file URI does not name a local path",
            })?;
            return Ok(Self::local(path));
        }

        Ok(Self::local(trimmed))
    }

    /// Root path of the table as given (without a trailing slash).
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Backend serving this table.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Join a relative path onto the table root.
    pub fn join(&self, rel: &str) -> String {
        let rel = rel.trim_start_matches('/');
        if self.root.is_empty() {
            rel.to_string()
        } else if self.root.ends_with('/') {
            format!("{}{}", self.root, rel)
        } else {
            format!("{}/{}", self.root, rel)
        }
    }

    /// `<root>/_delta_log`
    pub fn log_dir(&self) -> String {
        self.join(layout::LOG_DIR_NAME)
    }

    /// Resolve a data file path recorded in the log to a backend path.
    ///
    /// Relative paths are percent-decoded and joined with the root.
    /// Absolute `file://` URIs are reduced to their path; other absolute URIs
    /// are passed to the backend unchanged.
    pub fn resolve_data_path(&self, recorded: &str) -> String {
        if recorded.contains("://") {
            return layout::file_uri_path(recorded).unwrap_or_else(|| recorded.to_string());
        }
        self.join(&layout::decode_uri_path(recorded))
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)
    }
}

fn normalize_root(mut root: String) -> String {
    while root.len() > 1 && root.ends_with('/') {
        root.pop();
    }
    root
}
