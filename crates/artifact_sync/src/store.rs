//! Read-only client for the remote artifact store.

use core::time::Duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use experiment_structs::partial_path;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use object_store::path::Path as ObjectStorePath;
use object_store::{ObjectMeta, ObjectStore, ObjectStoreExt};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Failure transferring a single object.
///
/// Never fatal to a sync pass: callers log it, skip the item and retry on
/// a later cycle.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to list `{prefix}`: {source}")]
    List {
        prefix: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to fetch `{path}`: {source}")]
    Fetch {
        path: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetch of `{path}` timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },
}

impl TransferError {
    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An object listed in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Store-relative path using forward slashes.
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Read-only view of the remote artifact store.
///
/// Paths are relative to the store root and use forward slashes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Lists every object below `prefix` (empty for the whole store).
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError>;

    /// Copies one object to `local_path`, returning the bytes written.
    ///
    /// The destination only appears once the whole object was written.
    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64, TransferError>;
}

/// [`ArtifactStore`] backed by any `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectArtifactStore {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectStorePath,
}

impl ObjectArtifactStore {
    /// Wraps `store`, treating `prefix` as the root of the experiment tree.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, prefix: ObjectStorePath) -> Self {
        Self { store, prefix }
    }

    fn location(&self, relative_path: &str) -> ObjectStorePath {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.prefix.clone(), |path, segment| path.child(segment))
    }

    fn relative(&self, location: &ObjectStorePath) -> Option<String> {
        let full = location.as_ref();
        let prefix = self.prefix.as_ref();

        if prefix.is_empty() {
            return Some(full.to_owned());
        }

        full.strip_prefix(prefix)?
            .strip_prefix('/')
            .map(str::to_owned)
    }

    fn remote_object(&self, meta: ObjectMeta) -> Option<RemoteObject> {
        Some(RemoteObject {
            path: self.relative(&meta.location)?,
            size: meta.size,
            last_modified: meta.last_modified,
        })
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError> {
        let location = self.location(prefix);
        let location = (!location.as_ref().is_empty()).then_some(&location);

        let listing: Vec<ObjectMeta> = self
            .store
            .list(location)
            .try_collect()
            .await
            .map_err(|source| TransferError::List {
                prefix: prefix.to_owned(),
                source,
            })?;

        Ok(listing
            .into_iter()
            .filter_map(|meta| self.remote_object(meta))
            .collect())
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<u64, TransferError> {
        let location = self.location(remote_path);
        let fetch_error = |source| TransferError::Fetch {
            path: remote_path.to_owned(),
            source,
        };

        let result = self.store.get(&location).await.map_err(fetch_error)?;
        let partial = partial_path(local_path);

        let written = match write_stream(result.into_stream(), &partial).await {
            Ok(written) => written,
            Err(error) => {
                // best effort, partial files are never read as complete
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(error.into_transfer_error(remote_path, &partial));
            }
        };

        tokio::fs::rename(&partial, local_path)
            .await
            .map_err(|source| TransferError::write(local_path, source))?;

        debug!(remote_path, bytes = written, "Fetched artifact");
        Ok(written)
    }
}

enum StreamError {
    Read(object_store::Error),
    Write(std::io::Error),
}

impl StreamError {
    fn into_transfer_error(self, remote_path: &str, partial: &Path) -> TransferError {
        match self {
            Self::Read(source) => TransferError::Fetch {
                path: remote_path.to_owned(),
                source,
            },
            Self::Write(source) => TransferError::write(partial, source),
        }
    }
}

async fn write_stream(
    mut stream: BoxStream<'static, object_store::Result<bytes::Bytes>>,
    partial: &Path,
) -> Result<u64, StreamError> {
    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(StreamError::Write)?;
    let mut written = 0u64;

    while let Some(chunk) = stream.try_next().await.map_err(StreamError::Read)? {
        file.write_all(&chunk).await.map_err(StreamError::Write)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(StreamError::Write)?;
    file.sync_all().await.map_err(StreamError::Write)?;

    Ok(written)
}
