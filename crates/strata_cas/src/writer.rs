//! Streaming writer for the Content Addressable Store.

use std::{
    fmt::{Debug, Formatter},
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use fs_err::tokio as fs;
use pin_project_lite::pin_project;
use tokio::io::AsyncWriteExt;

use crate::{hash::HashingWriter, path_for_hash, temp_dir, BlobHash};

pin_project! {
    /// An async writer for streaming content into the CAS.
    ///
    /// Content is written to a temporary file. Calling [`Writer::stage`]
    /// finishes hashing and yields a [`StagedBlob`] which only becomes part of
    /// the store once it is persisted.
    pub struct Writer {
        temp_path: tempfile::TempPath,
        #[pin]
        writer: HashingWriter<tokio::fs::File>,
    }
}

impl Writer {
    /// Opens a new temporary file in the CAS and returns an async writer that
    /// can be used to write to it.
    ///
    /// Without a call to `stage` followed by a persist the file is deleted
    /// when dropped.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let temp_dir = temp_dir(root);
        fs::create_dir_all(&temp_dir).await?;

        let temp_file = tempfile::Builder::new()
            .prefix("blob-")
            .tempfile_in(&temp_dir)?;
        let (file, temp_path) = temp_file.into_parts();

        Ok(Writer {
            temp_path,
            writer: HashingWriter::new(tokio::fs::File::from_std(file)),
        })
    }

    /// Flushes all written content and computes its hash.
    pub async fn stage(mut self) -> io::Result<StagedBlob> {
        self.writer.flush().await?;

        let (file, hash, len) = self.writer.finalize();

        // Make sure there is no open handle left before the file is moved.
        drop(file);

        Ok(StagedBlob {
            hash,
            len,
            temp_path: self.temp_path,
        })
    }
}

impl tokio::io::AsyncWrite for Writer {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().writer.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().writer.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().writer.poll_shutdown(cx)
    }
}

/// A fully written and hashed blob that is not yet visible in the store.
///
/// The content lives in a temporary file inside the store until
/// [`StagedBlob::persist`] moves it to its content addressed location.
/// Dropping a staged blob removes the temporary file.
pub struct StagedBlob {
    hash: BlobHash,
    len: u64,
    temp_path: tempfile::TempPath,
}

impl Debug for StagedBlob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedBlob")
            .field("hash", &self.hash)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl StagedBlob {
    /// The content address the blob will have once persisted.
    pub fn hash(&self) -> BlobHash {
        self.hash
    }

    /// The number of bytes in the blob.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The path of the temporary file holding the content.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Moves the blob to its final location in the store rooted at `root`.
    ///
    /// If a blob with the same hash already exists the staged copy is
    /// discarded. This performs blocking IO.
    pub fn persist(self, root: &Path) -> io::Result<BlobHash> {
        let path: PathBuf = root.join(path_for_hash(&self.hash));

        fs_err::create_dir_all(path.parent().expect("hash paths always have a parent"))?;

        match self
            .temp_path
            .persist_noclobber(&path)
            .map_err(io::Error::from)
        {
            Ok(()) => Ok(self.hash),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(self.hash),
            Err(err) => Err(err),
        }
    }
}
