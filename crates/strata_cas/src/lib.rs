#![deny(missing_docs)]

//! Content Addressable Store (CAS) holding the values of strata datasets.
//!
//! # Layout
//!
//! Every blob is stored in a file named after the SHA-256 hash of its
//! content, fanned out over two levels of directories:
//! ```text
//! <root>/
//!   <first 2 hex chars>/
//!     <next 2 hex chars>/
//!       <remaining hex chars>
//! ```
//!
//! Content that is still being written lives in `<root>/.tmp` and is never
//! visible under its hash until it is complete.
//!
//! # Staging
//!
//! Streams of unknown length are written with a [`Writer`]. Calling
//! [`Writer::stage`] yields a [`StagedBlob`] which knows its final hash but is
//! not yet part of the store. This lets a caller decide whether the blob should
//! become visible at all, e.g. only after a concurrency check succeeded. A
//! staged blob that is dropped leaves no trace behind.
//!
//! ```rust,no_run
//! # async fn example() -> std::io::Result<()> {
//! use std::path::Path;
//! use tokio::io::AsyncWriteExt;
//!
//! let root = Path::new("/path/to/blobs");
//! let mut writer = strata_cas::Writer::create(root).await?;
//! writer.write_all(b"Hello, world!").await?;
//! let staged = writer.stage().await?;
//! let hash = staged.persist(root)?;
//! println!("stored as {hash}");
//! # Ok(())
//! # }
//! ```

mod hash;
mod writer;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

pub use hash::{BlobHash, ParseBlobHashError};
pub use writer::{StagedBlob, Writer};

/// Returns the directory to use for temporary files.
fn temp_dir(root: &Path) -> PathBuf {
    root.join(".tmp")
}

/// Streams the contents of an async reader into a new [`StagedBlob`].
///
/// Nothing becomes visible in the store until the returned blob is
/// persisted.
pub async fn stage(
    root: &Path,
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
) -> std::io::Result<StagedBlob> {
    let mut w = Writer::create(root).await?;
    tokio::io::copy(reader, &mut w).await?;
    w.stage().await
}

/// Writes the contents of an async reader to the CAS and returns the hash of
/// the written blob.
pub async fn write(
    root: &Path,
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
) -> std::io::Result<BlobHash> {
    let staged = stage(root, reader).await?;
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || staged.persist(&root))
        .await
        .map_err(tokio::task::JoinError::try_into_panic)
    {
        Ok(result) => result,
        Err(Err(e)) => Err(std::io::Error::new(std::io::ErrorKind::Interrupted, e)),
        Err(Ok(panic)) => std::panic::resume_unwind(panic),
    }
}

/// Writes a byte buffer to the CAS, returning the content hash.
///
/// The hash is computed from the buffer first so content that is already
/// stored is never written again. Used for small values such as commit
/// records. This performs blocking IO.
pub fn write_bytes(root: &Path, content: &[u8]) -> std::io::Result<BlobHash> {
    let hash = BlobHash::of(content);
    let path = root.join(path_for_hash(&hash));

    if path.exists() {
        return Ok(hash);
    }

    fs_err::create_dir_all(path.parent().expect("hash paths always have a parent"))?;

    let temp_dir = temp_dir(root);
    fs_err::create_dir_all(&temp_dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix("blob-")
        .tempfile_in(&temp_dir)?;
    temp.write_all(content)?;
    temp.flush()?;

    // A concurrent writer may have stored the same content in the meantime.
    match temp.persist_noclobber(&path) {
        Ok(_) => Ok(hash),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(hash),
        Err(e) => Err(e.error),
    }
}

/// Reads the full content of the blob with the given hash. This performs
/// blocking IO.
pub fn read(root: &Path, hash: &BlobHash) -> std::io::Result<Vec<u8>> {
    fs_err::read(root.join(path_for_hash(hash)))
}

/// Returns true if a blob with the given hash is stored under `root`.
pub fn contains(root: &Path, hash: &BlobHash) -> bool {
    root.join(path_for_hash(hash)).is_file()
}

/// Returns the relative path in the CAS for a given hash. Note that the path
/// might not exist.
pub fn path_for_hash(hash: &BlobHash) -> PathBuf {
    let hash_str = hash.to_string();
    PathBuf::from(&hash_str[0..2])
        .join(&hash_str[2..4])
        .join(&hash_str[4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_path_for_hash() {
        let hash = BlobHash::of(b"");
        let path = path_for_hash(&hash);
        assert_eq!(
            path,
            PathBuf::from("e3")
                .join("b0")
                .join("c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[tokio::test]
    async fn test_write_basic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let content = b"Hello, async CAS!";
        let hash = write(cas_root, &mut Cursor::new(content.to_vec()))
            .await
            .unwrap();

        assert_eq!(hash, BlobHash::of(content));
        assert!(contains(cas_root, &hash));
        assert_eq!(read(cas_root, &hash).unwrap(), content);
    }

    #[tokio::test]
    async fn test_write_deduplication() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let content = b"Async duplicate content";
        let hash1 = write(cas_root, &mut Cursor::new(content.to_vec()))
            .await
            .unwrap();
        let hash2 = write(cas_root, &mut Cursor::new(content.to_vec()))
            .await
            .unwrap();

        assert_eq!(hash1, hash2);
    }

    #[tokio::test]
    async fn test_staged_blob_is_invisible_until_persisted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let mut writer = Writer::create(cas_root).await.unwrap();
        writer.write_all(b"Part 1").await.unwrap();
        writer.write_all(b" Part 2").await.unwrap();
        let staged = writer.stage().await.unwrap();

        assert_eq!(staged.len(), 13);
        assert_eq!(staged.hash(), BlobHash::of(b"Part 1 Part 2"));
        assert!(!contains(cas_root, &staged.hash()));

        let hash = staged.persist(cas_root).unwrap();
        assert_eq!(
            std::fs::read_to_string(cas_root.join(path_for_hash(&hash))).unwrap(),
            "Part 1 Part 2"
        );
    }

    #[tokio::test]
    async fn test_dropped_staged_blob_leaves_nothing_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let staged = stage(cas_root, &mut Cursor::new(b"discard me".to_vec()))
            .await
            .unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        let hash = staged.hash();
        assert!(temp_path.exists());

        drop(staged);

        assert!(!temp_path.exists());
        assert!(!contains(cas_root, &hash));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let staged = stage(cas_root, &mut Cursor::new(Vec::new())).await.unwrap();
        assert!(staged.is_empty());
        assert_eq!(
            staged.hash().to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_write_bytes_deduplication() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let content = b"Duplicate buffered content";
        let hash1 = write_bytes(cas_root, content).unwrap();
        let tmp_count = std::fs::read_dir(cas_root.join(".tmp")).unwrap().count();
        let hash2 = write_bytes(cas_root, content).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(read(cas_root, &hash1).unwrap(), content);
        assert_eq!(
            std::fs::read_dir(cas_root.join(".tmp")).unwrap().count(),
            tmp_count
        );
    }

    #[tokio::test]
    async fn test_write_bytes_matches_streamed_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cas_root = temp_dir.path();

        let content = b"Content for both methods";
        let hash_bytes = write_bytes(cas_root, content).unwrap();
        let hash_stream = write(cas_root, &mut Cursor::new(content.to_vec()))
            .await
            .unwrap();

        assert_eq!(hash_bytes, hash_stream);
    }

    #[test]
    fn test_read_missing_blob() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = read(temp_dir.path(), &BlobHash::of(b"missing")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
