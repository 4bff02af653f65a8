use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// Wraps an [`AsyncRead`] and calls a callback with the total number of
    /// bytes read so far every time new bytes come through.
    ///
    /// The content of the stream is not modified. End of stream and errors do
    /// not invoke the callback.
    pub struct ProgressReader<R, F> {
        #[pin]
        reader: R,
        bytes_read: u64,
        on_progress: F,
    }
}

impl<R, F: FnMut(u64)> ProgressReader<R, F> {
    /// Wraps `reader`, calling `on_progress` inline with every read.
    pub fn new(reader: R, on_progress: F) -> Self {
        Self {
            reader,
            bytes_read: 0,
            on_progress,
        }
    }

    /// The number of bytes that passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead, F: FnMut(u64)> AsyncRead for ProgressReader<R, F> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        match this.reader.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    *this.bytes_read += n as u64;
                    (this.on_progress)(*this.bytes_read);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
