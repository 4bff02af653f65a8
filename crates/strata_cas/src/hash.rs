//! Content addresses of blobs and a writer that computes them on the fly.

use std::{
    borrow::Cow,
    fmt::{self, Debug, Display, Formatter, LowerHex},
    io,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};

use pin_project_lite::pin_project;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWrite;

/// The content address of a blob: the SHA-256 hash of its bytes.
///
/// Two blobs with identical content always have the same hash. The textual
/// representation is the lowercase hex encoding of the 32 hash bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHash([u8; 32]);

impl BlobHash {
    /// The length of the hex representation of a hash.
    pub const HEX_LEN: usize = 64;

    /// Computes the hash of the given bytes.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self::from_digest(Sha256::digest(bytes.as_ref()))
    }

    /// Constructs a hash from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn from_digest(digest: sha2::digest::Output<Sha256>) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

/// Error returned when a string is not a valid hex encoded [`BlobHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{input}' is not a valid blob hash, expected {} hex characters", BlobHash::HEX_LEN)]
pub struct ParseBlobHashError {
    input: String,
}

impl FromStr for BlobHash {
    type Err = ParseBlobHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseBlobHashError {
            input: s.to_owned(),
        })?;
        Ok(Self(bytes))
    }
}

impl LowerHex for BlobHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Display for BlobHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(self, f)
    }
}

impl Debug for BlobHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({self:x})")
    }
}

impl Serialize for BlobHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlobHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Cow::<'de, str>::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

pin_project! {
    /// Forwards all writes to the wrapped writer while hashing and counting
    /// the bytes that were accepted by it.
    pub(crate) struct HashingWriter<W> {
        #[pin]
        writer: W,
        hasher: Sha256,
        len: u64,
    }
}

impl<W> HashingWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Sha256::new(),
            len: 0,
        }
    }

    /// Consumes the writer and returns the wrapped writer, the hash and the
    /// number of bytes written.
    pub(crate) fn finalize(self) -> (W, BlobHash, u64) {
        (
            self.writer,
            BlobHash::from_digest(self.hasher.finalize()),
            self.len,
        )
    }
}

impl<W: AsyncWrite> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        match this.writer.poll_write(cx, buf) {
            Poll::Ready(Ok(bytes)) => {
                this.hasher.update(&buf[..bytes]);
                *this.len += bytes as u64;
                Poll::Ready(Ok(bytes))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().writer.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().writer.poll_shutdown(cx)
    }
}
