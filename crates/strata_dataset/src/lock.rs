use std::{
    fmt::{Debug, Formatter},
    path::Path,
};

use fs4::fs_std::FileExt;

/// An exclusive lock on the heads of a database.
///
/// The lock is only held while a head is compared and replaced, never while
/// content is streamed. It is released when dropped. This performs blocking
/// IO.
pub(crate) struct HeadLock {
    file: std::fs::File,
}

impl Debug for HeadLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadLock").finish()
    }
}

impl Drop for HeadLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl HeadLock {
    pub(crate) fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(path)?
            .into_parts()
            .0;

        FileExt::lock_exclusive(&file)?;

        Ok(HeadLock { file })
    }
}
