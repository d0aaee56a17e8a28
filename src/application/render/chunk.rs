//! Output chunks and fragment boundaries.
//!
//! A [`Chunk`] buffers text on its way to a downstream sink: either the
//! client connection or a capture buffer owned by an enclosing fragment.
//! A [`FragmentBoundary`] takes over whatever the chunk had buffered when the
//! fragment started and emits it, followed by the fragment's own text, in a
//! single commit.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("fragment boundary was already committed")]
    AlreadyCommitted,
}

/// Sending half of a client connection.
///
/// Delivery to a disconnected client is dropped silently; rendering and
/// cache population continue regardless.
#[derive(Debug, Clone)]
pub struct ClientStream {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ClientStream {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false when the client has gone away.
    pub fn send(&self, bytes: Bytes) -> bool {
        if bytes.is_empty() {
            return !self.tx.is_closed();
        }
        let len = bytes.len();
        match self.tx.send(bytes) {
            Ok(()) => true,
            Err(_) => {
                debug!(
                    op = "client_stream::send",
                    bytes = len,
                    result = "disconnected",
                    "Client disconnected, dropping output"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
enum Sink {
    Client(ClientStream),
    Capture(String),
}

/// Buffered output for one level of the render tree.
#[derive(Debug)]
pub struct Chunk {
    buffer: String,
    sink: Sink,
}

impl Chunk {
    /// A chunk whose flushed output goes straight to the client.
    pub fn streaming(client: ClientStream) -> Self {
        Self {
            buffer: String::new(),
            sink: Sink::Client(client),
        }
    }

    /// A chunk that collects its output in memory.
    pub fn capture() -> Self {
        Self {
            buffer: String::new(),
            sink: Sink::Capture(String::new()),
        }
    }

    pub fn write(&mut self, text: &str) -> &mut Self {
        self.buffer.push_str(text);
        self
    }

    /// Text written but not yet flushed.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Move buffered text downstream.
    pub fn flush(&mut self) {
        let text = std::mem::take(&mut self.buffer);
        self.emit(text);
    }

    /// Open a boundary for a fragment rendered at the current position.
    ///
    /// The boundary owns the buffered text until it is committed. A boundary
    /// dropped without committing hands that text back to the chunk.
    pub fn boundary(&mut self) -> FragmentBoundary<'_> {
        let prefix = std::mem::take(&mut self.buffer);
        FragmentBoundary {
            chunk: self,
            prefix,
            body: String::new(),
            state: BoundaryState::Open,
        }
    }

    /// Flush and return everything captured. Streaming chunks return an empty string.
    pub fn finish(mut self) -> String {
        self.flush();
        match self.sink {
            Sink::Capture(captured) => captured,
            Sink::Client(_) => String::new(),
        }
    }

    fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        match &mut self.sink {
            Sink::Client(client) => {
                client.send(Bytes::from(text));
            }
            Sink::Capture(captured) => captured.push_str(&text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    Open,
    Writing,
    Committed,
}

/// Output region of one cached fragment; committed exactly once.
#[derive(Debug)]
pub struct FragmentBoundary<'a> {
    chunk: &'a mut Chunk,
    prefix: String,
    body: String,
    state: BoundaryState,
}

impl FragmentBoundary<'_> {
    pub fn state(&self) -> BoundaryState {
        self.state
    }

    /// Text that preceded the fragment in the enclosing chunk.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn write(&mut self, text: &str) -> Result<(), ChunkError> {
        if self.state == BoundaryState::Committed {
            return Err(ChunkError::AlreadyCommitted);
        }
        self.state = BoundaryState::Writing;
        self.body.push_str(text);
        Ok(())
    }

    /// Emit the prefix followed by the fragment text. Returns the bytes emitted.
    pub fn commit(&mut self) -> Result<usize, ChunkError> {
        if self.state == BoundaryState::Committed {
            return Err(ChunkError::AlreadyCommitted);
        }
        self.state = BoundaryState::Committed;
        let mut text = std::mem::take(&mut self.prefix);
        text.push_str(&self.body);
        self.body.clear();
        let emitted = text.len();
        self.chunk.emit(text);
        Ok(emitted)
    }
}

impl Drop for FragmentBoundary<'_> {
    fn drop(&mut self) {
        if self.state != BoundaryState::Committed {
            let prefix = std::mem::take(&mut self.prefix);
            self.chunk.buffer.insert_str(0, &prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_emits_prefix_then_body_once() {
        let mut chunk = Chunk::capture();
        chunk.write("<header/>");
        {
            let mut boundary = chunk.boundary();
            assert_eq!(boundary.prefix(), "<header/>");
            assert_eq!(boundary.state(), BoundaryState::Open);
            boundary.write("<div>Hero</div>").expect("open boundary");
            assert_eq!(boundary.state(), BoundaryState::Writing);
            assert_eq!(boundary.commit().expect("first commit"), 24);
            assert_eq!(boundary.commit(), Err(ChunkError::AlreadyCommitted));
            assert_eq!(boundary.write("late"), Err(ChunkError::AlreadyCommitted));
        }
        chunk.write("<footer/>");
        assert_eq!(chunk.finish(), "<header/><div>Hero</div><footer/>");
    }

    #[test]
    fn abandoned_boundary_returns_prefix() {
        let mut chunk = Chunk::capture();
        chunk.write("before");
        {
            let mut boundary = chunk.boundary();
            boundary.write("discarded").expect("open boundary");
        }
        assert_eq!(chunk.buffered(), "before");
        assert_eq!(chunk.finish(), "before");
    }

    #[tokio::test]
    async fn streaming_chunk_delivers_in_order() {
        let (client, mut rx) = ClientStream::channel();
        let mut chunk = Chunk::streaming(client);
        chunk.write("a");
        chunk.flush();
        chunk.write("b");
        {
            let mut boundary = chunk.boundary();
            boundary.write("c").expect("open boundary");
            boundary.commit().expect("commit");
        }
        drop(chunk);

        let mut received = Vec::new();
        while let Some(bytes) = rx.recv().await {
            received.push(bytes);
        }
        assert_eq!(received, vec![Bytes::from("a"), Bytes::from("bc")]);
    }

    #[test]
    fn disconnected_client_is_ignored() {
        let (client, rx) = ClientStream::channel();
        drop(rx);
        assert!(!client.send(Bytes::from("x")));

        let mut chunk = Chunk::streaming(client);
        chunk.write("y");
        chunk.flush();
        assert!(chunk.buffered().is_empty());
    }
}
