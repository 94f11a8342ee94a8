//! Local byte sources.
//!
//! A [`ByteSourceHandle`] owns the open resource for the whole transfer.
//! Only the progress tap reads from it, and only the completion
//! reconciler closes it.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::TransferError;

/// Future returned by [`ByteSource::read_chunk`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Bytes>> + Send + 'a>>;

/// A readable resource with a length fixed when it was opened.
pub trait ByteSource: Send {
    /// Total bytes the source will yield.
    fn size(&self) -> u64;

    /// Reads up to `max_len` bytes. An empty buffer means end of stream.
    fn read_chunk(&mut self, max_len: usize) -> ReadFuture<'_>;

    /// Releases the resource. Called at most once.
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// A regular file on the local filesystem.
pub struct FileSource {
    file: tokio::fs::File,
    size: u64,
}

impl FileSource {
    /// Opens `path` for reading and records its current length.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| open_error(path, e))?;
        let metadata = file.metadata().await.map_err(|e| open_error(path, e))?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.to_path_buf()));
        }
        Ok(Self {
            file,
            size: metadata.len(),
        })
    }
}

fn open_error(path: &Path, err: io::Error) -> TransferError {
    match err.kind() {
        io::ErrorKind::NotFound => TransferError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => TransferError::PermissionDenied(path.to_path_buf()),
        io::ErrorKind::IsADirectory => TransferError::NotAFile(path.to_path_buf()),
        _ => TransferError::Io(err),
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_chunk(&mut self, max_len: usize) -> ReadFuture<'_> {
        Box::pin(async move {
            let mut buf = vec![0u8; max_len];
            let n = self.file.read(&mut buf).await?;
            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
    }
}

/// Owned handle over a [`ByteSource`].
///
/// Caches the size at construction and counts the bytes handed out.
pub struct ByteSourceHandle {
    source: Box<dyn ByteSource>,
    label: String,
    size: u64,
    consumed: u64,
}

impl ByteSourceHandle {
    /// Opens a regular file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let source = FileSource::open(path).await?;
        debug!(path = %path.display(), size = source.size, "opened local file");
        Ok(Self::new(source, path.display().to_string()))
    }

    /// Wraps an arbitrary source. `label` is used in logs.
    pub fn new(source: impl ByteSource + 'static, label: impl Into<String>) -> Self {
        let size = source.size();
        Self {
            source: Box::new(source),
            label: label.into(),
            size,
            consumed: 0,
        }
    }

    /// Length fixed at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes read from the source so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, TransferError> {
        let chunk = self.source.read_chunk(max_len).await?;
        if chunk.len() > max_len {
            return Err(TransferError::InvariantViolation(format!(
                "source returned {} bytes for a {max_len}-byte read",
                chunk.len()
            )));
        }
        self.consumed += chunk.len() as u64;
        Ok(chunk)
    }

    pub(crate) fn close(self) -> Result<(), TransferError> {
        debug!(source = %self.label, consumed = self.consumed, "closing source");
        self.source.close().map_err(TransferError::Io)
    }
}

impl std::fmt::Debug for ByteSourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSourceHandle")
            .field("label", &self.label)
            .field("size", &self.size)
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// Resolves the file name sent to the server for `path`.
pub fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
