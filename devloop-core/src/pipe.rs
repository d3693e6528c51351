//! Bounded in-memory byte pipe between a blocking writer and an async reader.
//!
//! The writer side implements [`std::io::Write`] so synchronous encoders (the
//! tar builder) can stream into it from a blocking thread; it blocks once
//! `capacity` chunks are queued and unread. The reader side is consumed from
//! async code, typically an upload.
//!
//! A writer dropped without [`PipeWriter::finish`] delivers an error to the
//! reader instead of a clean end-of-stream, so a half-written archive is never
//! mistaken for a complete one.

use std::io::{self, Write};

use tokio::sync::mpsc;

/// Size of each chunk handed to the reader.
pub const CHUNK_SIZE: usize = 32 * 1024;

type Chunk = io::Result<Vec<u8>>;

/// Create a pipe holding at most `capacity` unread chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
            finished: false,
        },
        PipeReader { rx },
    )
}

/// Blocking write end. Must not be used from inside an async task.
pub struct PipeWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
    finished: bool,
}

impl PipeWriter {
    /// Flush buffered bytes and close the pipe cleanly.
    pub fn finish(mut self) -> io::Result<()> {
        self.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Close the pipe with an error visible to the reader.
    pub fn abort(mut self, reason: impl Into<String>) {
        self.finished = true;
        let _ = self.tx.blocking_send(Err(io::Error::other(reason.into())));
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.send_buffered()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tx.try_send(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "pipe writer dropped before finishing",
            )));
        }
    }
}

/// Async read end.
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
}

impl PipeReader {
    /// Next chunk, `None` once the writer finished cleanly.
    pub async fn recv(&mut self) -> Option<io::Result<Vec<u8>>> {
        self.rx.recv().await
    }

    /// Drain the whole stream into memory.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.recv().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}
