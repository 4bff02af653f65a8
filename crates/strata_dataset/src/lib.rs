#![deny(missing_docs)]

//! A small database of named, versioned datasets.
//!
//! A database is a directory with the following layout:
//! ```text
//! <root>/
//!   blobs/     content addressed values (see strata_cas)
//!   commits/   content addressed commit records
//!   refs/      one file per dataset holding the hash of its head commit
//!   refs/.lock lock taken while a head is replaced
//! ```
//!
//! Updating a dataset is optimistic: a [`Dataset`] snapshot remembers the
//! head it was read at and [`Database::commit`] only succeeds if the head is
//! still the same at the time of the commit. Otherwise
//! [`CommitError::MergeNeeded`] is returned and nothing is changed. No lock is
//! held between reading a dataset and committing to it.

mod commit;
mod dataset;
mod error;
mod lock;

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

pub use commit::{Commit, CommitMeta, CommitOptions, ReservedKeyError, RESERVED_META_KEYS};
pub use dataset::{Dataset, Head};
pub use error::{CommitError, DatabaseError};
pub use strata_cas::{BlobHash, StagedBlob};
use tokio::io::AsyncRead;

use crate::{dataset::ref_path, lock::HeadLock};

const BLOBS_DIR: &str = "blobs";
const COMMITS_DIR: &str = "commits";
const REFS_DIR: &str = "refs";
const LOCK_FILE: &str = ".lock";

/// A handle to a database on disk.
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
}

impl Database {
    /// Opens the database at `root`, creating its directory layout if it
    /// does not exist yet. This performs blocking IO.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let root = root.into();
        for dir in [BLOBS_DIR, COMMITS_DIR, REFS_DIR] {
            fs_err::create_dir_all(root.join(dir))
                .map_err(|e| DatabaseError::Open(root.clone(), e))?;
        }
        tracing::debug!("opened database at '{}'", root.display());
        Ok(Self { root })
    }

    /// The root directory of the database.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_root(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    fn commit_root(&self) -> PathBuf {
        self.root.join(COMMITS_DIR)
    }

    fn refs_root(&self) -> PathBuf {
        self.root.join(REFS_DIR)
    }

    /// Reads a snapshot of the dataset with the given name. A dataset that
    /// was never committed to is returned without a head. This performs
    /// blocking IO.
    pub fn dataset(&self, name: &str) -> Result<Dataset, DatabaseError> {
        let ref_path = self.refs_root().join(ref_path(name)?);
        let head = match read_head_hash(&ref_path, name)? {
            Some(hash) => Some(Head {
                hash,
                commit: self.read_commit(&hash)?,
            }),
            None => None,
        };
        Ok(Dataset::new(name.to_owned(), head))
    }

    /// Reads and decodes the commit with the given hash. This performs
    /// blocking IO.
    pub fn read_commit(&self, hash: &BlobHash) -> Result<Commit, DatabaseError> {
        let bytes = strata_cas::read(&self.commit_root(), hash)
            .map_err(|e| DatabaseError::ReadCommit(*hash, e))?;
        serde_json::from_slice(&bytes).map_err(|e| DatabaseError::DecodeCommit(*hash, e))
    }

    /// Reads the full content of a blob. This performs blocking IO.
    pub fn read_blob(&self, hash: &BlobHash) -> Result<Vec<u8>, DatabaseError> {
        strata_cas::read(&self.blob_root(), hash).map_err(|e| DatabaseError::ReadBlob(*hash, e))
    }

    /// Returns true if the database stores a blob with the given hash.
    pub fn contains_blob(&self, hash: &BlobHash) -> bool {
        strata_cas::contains(&self.blob_root(), hash)
    }

    /// Streams the content of `reader` into a blob that is not yet part of
    /// the database. Use [`Database::write_value`] or [`Database::commit`] to
    /// store it.
    pub async fn stage_blob(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
    ) -> Result<StagedBlob, DatabaseError> {
        strata_cas::stage(&self.blob_root(), reader)
            .await
            .map_err(DatabaseError::StageBlob)
    }

    /// Stores a blob without referencing it from any dataset and returns its
    /// content address.
    pub async fn write_value(&self, blob: StagedBlob) -> Result<BlobHash, DatabaseError> {
        let blob_root = self.blob_root();
        run_blocking(move || {
            let hash = blob.hash();
            blob.persist(&blob_root)
                .map_err(|e| DatabaseError::WriteBlob(hash, e))
        })
        .await
    }

    /// Commits `blob` as the new head of `dataset`.
    ///
    /// The commit is built on top of the head the snapshot was read at. If
    /// the head of the dataset moved in the meantime
    /// [`CommitError::MergeNeeded`] is returned and neither the blob nor the
    /// commit are stored. On success the new head is returned.
    pub async fn commit(
        &self,
        dataset: &Dataset,
        blob: StagedBlob,
        options: CommitOptions,
    ) -> Result<Head, CommitError> {
        let this = self.clone();
        let dataset = dataset.clone();
        run_blocking(move || this.commit_blocking(&dataset, blob, options)).await
    }

    fn commit_blocking(
        &self,
        dataset: &Dataset,
        blob: StagedBlob,
        options: CommitOptions,
    ) -> Result<Head, CommitError> {
        let name = dataset.name();
        let ref_path = self.refs_root().join(ref_path(name)?);

        let _lock = HeadLock::acquire(&self.refs_root().join(LOCK_FILE)).map_err(CommitError::Lock)?;

        let expected = dataset.head_hash();
        let actual = read_head_hash(&ref_path, name)?;
        if actual != expected {
            tracing::debug!("head of '{name}' moved, refusing to commit");
            return Err(CommitError::MergeNeeded {
                dataset: name.to_owned(),
                expected,
                actual,
            });
        }

        let value = blob.hash();
        blob.persist(&self.blob_root())
            .map_err(|e| DatabaseError::WriteBlob(value, e))?;

        let commit = Commit {
            value,
            parents: expected.into_iter().collect(),
            meta: options.meta,
        };
        let bytes = commit.to_bytes().map_err(CommitError::Encode)?;
        let hash = BlobHash::of(&bytes);
        strata_cas::write_bytes(&self.commit_root(), &bytes)
            .map_err(|e| CommitError::WriteCommit(hash, e))?;

        write_head_hash(&ref_path, &hash).map_err(|e| CommitError::UpdateHead(name.to_owned(), e))?;
        tracing::info!("committed {hash} as the new head of '{name}'");

        Ok(Head { hash, commit })
    }
}

/// Reads the hash stored in a head file. A missing file means the dataset
/// has no head.
fn read_head_hash(path: &Path, name: &str) -> Result<Option<BlobHash>, DatabaseError> {
    match fs_err::read_to_string(path) {
        Ok(content) => content
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DatabaseError::CorruptHead(name.to_owned(), e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DatabaseError::ReadHead(name.to_owned(), e)),
    }
}

/// Atomically replaces the content of a head file.
fn write_head_hash(path: &Path, hash: &BlobHash) -> std::io::Result<()> {
    let parent = path.parent().expect("head files always have a parent");
    fs_err::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".head-")
        .tempfile_in(parent)?;
    writeln!(temp, "{hash}")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Runs blocking IO on the blocking thread pool, propagating panics.
async fn run_blocking<T, E, F>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<DatabaseError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) => match err.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            Err(_) => Err(DatabaseError::Cancelled.into()),
        },
    }
}
