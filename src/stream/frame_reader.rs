use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tokio::sync::mpsc;

const DATA_PREFIX: &[u8] = b"data:";
const MIN_FRAME_LINE: usize = b"data: ".len();

/// Message from the frame reader task to the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderSignal {
    /// One `data:` payload, prefix and trailing `\r` removed.
    Frame(String),
    /// The upstream body has ended. Always the last signal.
    Exhausted,
}

/// Incremental `\n`-delimited splitter for upstream SSE bytes.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: BytesMut,
    scanned: usize,
}

impl FrameSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and push every payload completed by it onto `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);

        let mut from = self.scanned;
        while let Some(rel) = memchr(b'\n', &self.buffer[from..]) {
            let line = self.buffer.split_to(from + rel + 1);
            if let Some(payload) = payload_from_line(&line[..line.len() - 1]) {
                out.push(payload);
            }
            from = 0;
        }
        self.scanned = self.buffer.len();
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self, out: &mut Vec<String>) {
        let line = self.buffer.split();
        self.scanned = 0;
        if let Some(payload) = payload_from_line(&line) {
            out.push(payload);
        }
    }
}

fn payload_from_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() < MIN_FRAME_LINE {
        return None;
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        tracing::debug!(line = %String::from_utf8_lossy(line), "skipping non-data SSE line");
        return None;
    };
    let rest = rest.strip_prefix(b" ").unwrap_or(rest);
    Some(String::from_utf8_lossy(rest).into_owned())
}

/// Read `byte_stream` on its own task, handing payloads over a channel of
/// capacity one.
///
/// A read error ends the stream like normal exhaustion. Dropping the receiver
/// stops the task and with it the upstream body.
pub fn spawn_frame_reader<S, E>(byte_stream: S) -> mpsc::Receiver<ReaderSignal>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut stream = Box::pin(byte_stream);
        let mut splitter = FrameSplitter::new();
        let mut payloads = Vec::with_capacity(4);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => splitter.feed(&bytes, &mut payloads),
                Err(err) => {
                    tracing::warn!(error = %err, "upstream stream read failed");
                    break;
                }
            }
            for payload in payloads.drain(..) {
                if tx.send(ReaderSignal::Frame(payload)).await.is_err() {
                    return;
                }
            }
        }

        splitter.finish(&mut payloads);
        for payload in payloads.drain(..) {
            if tx.send(ReaderSignal::Frame(payload)).await.is_err() {
                return;
            }
        }
        let _ = tx.send(ReaderSignal::Exhausted).await;
    });

    rx
}
