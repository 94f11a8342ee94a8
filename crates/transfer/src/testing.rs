//! Test doubles: a scripted byte source and a minimal HTTP server.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::source::{ByteSource, ReadFuture};

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

/// Observations shared between a [`ScriptedSource`] and the test.
#[derive(Default)]
pub(crate) struct SourceProbe {
    closes: AtomicUsize,
    dropped_unclosed: AtomicUsize,
    reads_after_close: AtomicUsize,
    bytes_read: AtomicU64,
    max_request: AtomicUsize,
    max_backlog: AtomicU64,
}

impl SourceProbe {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn dropped_unclosed(&self) -> usize {
        self.dropped_unclosed.load(Ordering::SeqCst)
    }

    pub fn reads_after_close(&self) -> usize {
        self.reads_after_close.load(Ordering::SeqCst)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub fn max_request(&self) -> usize {
        self.max_request.load(Ordering::SeqCst)
    }

    /// Largest gap between bytes read and bytes the server had received.
    pub fn max_backlog(&self) -> u64 {
        self.max_backlog.load(Ordering::SeqCst)
    }

    /// Asserts the source was closed exactly once and never touched after.
    pub fn assert_closed_once(&self) {
        assert_eq!(self.closes(), 1, "source must be closed exactly once");
        assert_eq!(self.dropped_unclosed(), 0, "source dropped without close");
        assert_eq!(self.reads_after_close(), 0, "source read after close");
    }
}

/// In-memory source with a deterministic byte pattern.
pub(crate) struct ScriptedSource {
    declared: u64,
    /// `None` yields bytes forever.
    available: Option<u64>,
    short_reads: Option<usize>,
    fail_close: bool,
    received: Option<Arc<AtomicU64>>,
    pos: u64,
    closed: bool,
    probe: Arc<SourceProbe>,
}

impl ScriptedSource {
    /// Source of exactly `size` bytes.
    pub fn patterned(size: u64) -> (Self, Arc<SourceProbe>) {
        Self::build(size, Some(size))
    }

    /// Source claiming `declared` bytes that never reaches end of stream.
    pub fn unbounded(declared: u64) -> (Self, Arc<SourceProbe>) {
        Self::build(declared, None)
    }

    fn build(declared: u64, available: Option<u64>) -> (Self, Arc<SourceProbe>) {
        let probe = Arc::new(SourceProbe::default());
        let source = Self {
            declared,
            available,
            short_reads: None,
            fail_close: false,
            received: None,
            pos: 0,
            closed: false,
            probe: Arc::clone(&probe),
        };
        (source, probe)
    }

    /// Caps every read at `n` bytes.
    pub fn with_short_reads(mut self, n: usize) -> Self {
        self.short_reads = Some(n);
        self
    }

    /// Ends the stream after `n` bytes regardless of the declared size.
    pub fn truncated_at(mut self, n: u64) -> Self {
        self.available = Some(n);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Records the read-ahead relative to a server-side byte counter.
    pub fn tracking_backlog(mut self, received: Arc<AtomicU64>) -> Self {
        self.received = Some(received);
        self
    }
}

impl ByteSource for ScriptedSource {
    fn size(&self) -> u64 {
        self.declared
    }

    fn read_chunk(&mut self, max_len: usize) -> ReadFuture<'_> {
        Box::pin(async move {
            if self.closed {
                self.probe.reads_after_close.fetch_add(1, Ordering::SeqCst);
            }
            self.probe.max_request.fetch_max(max_len, Ordering::SeqCst);

            if let Some(received) = &self.received {
                let gap = self.pos.saturating_sub(received.load(Ordering::SeqCst));
                self.probe.max_backlog.fetch_max(gap, Ordering::SeqCst);
            }

            let mut n = max_len as u64;
            if let Some(cap) = self.short_reads {
                n = n.min(cap as u64);
            }
            if let Some(available) = self.available {
                n = n.min(available.saturating_sub(self.pos));
            }

            let start = self.pos;
            let data: Vec<u8> = (start..start + n).map(|i| (i % 251) as u8).collect();
            self.pos += n;
            self.probe.bytes_read.fetch_add(n, Ordering::SeqCst);
            Ok(Bytes::from(data))
        })
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.closed = true;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        if !self.closed {
            self.probe.dropped_unclosed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Expected bytes of a patterned source.
pub(crate) fn pattern(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// MockServer
// ---------------------------------------------------------------------------

/// Bodies larger than this are counted but not kept.
const KEEP_BODY_LIMIT: u64 = 1024 * 1024;

/// How the mock answers its single request.
pub(crate) enum Reply {
    /// Reads the whole request, waits, then answers.
    After {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// Answers as soon as the headers arrive and stops reading.
    Early { status: u16, body: String },
    /// Closes the connection once `n` body bytes have arrived.
    DropAfter(u64),
    /// Reads the whole request and never answers.
    Silent,
    /// Keeps the connection open but stops reading after the headers.
    Stall,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Reply::After {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: u16, body: &str, delay: Duration) -> Self {
        Reply::After {
            status,
            body: body.to_string(),
            delay,
        }
    }

    pub fn early(status: u16, body: &str) -> Self {
        Reply::Early {
            status,
            body: body.to_string(),
        }
    }
}

/// What the server saw.
pub(crate) struct Captured {
    pub head: String,
    pub body: Vec<u8>,
    pub body_len: u64,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.head, name)
    }
}

/// Single-connection HTTP/1.1 server on an ephemeral port.
pub(crate) struct MockServer {
    pub url: String,
    /// Body bytes received so far.
    pub received: Arc<AtomicU64>,
    task: Option<JoinHandle<Option<Captured>>>,
}

impl MockServer {
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        let task = tokio::spawn(async move { serve(listener, reply, counter).await });
        Self {
            url: format!("http://{addr}"),
            received,
            task: Some(task),
        }
    }

    /// Waits for the connection to finish and returns the request.
    pub async fn captured(mut self) -> Captured {
        let task = self.task.take().unwrap();
        task.await.unwrap().expect("no request captured")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn serve(listener: TcpListener, reply: Reply, received: Arc<AtomicU64>) -> Option<Captured> {
    let (mut stream, _) = listener.accept().await.ok()?;
    let mut buf = Vec::new();
    let mut tmp = vec![0u8; 64 * 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = header_value(&head, "content-length")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let keep = content_length <= KEEP_BODY_LIMIT;
    let mut captured = Captured {
        head,
        body: Vec::new(),
        body_len: 0,
    };
    let leftover = buf[header_end..].to_vec();
    record(&mut captured, &leftover, keep, &received);

    match reply {
        Reply::Early { status, body } => {
            write_response(&mut stream, status, &body).await;
            // Hold the connection open without reading.
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some(captured)
        }
        Reply::DropAfter(limit) => {
            while captured.body_len < limit {
                let n = stream.read(&mut tmp).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                record(&mut captured, &tmp[..n], keep, &received);
            }
            drop(stream);
            Some(captured)
        }
        Reply::After { status, body, delay } => {
            if !read_body(&mut stream, &mut tmp, &mut captured, content_length, keep, &received).await {
                return Some(captured);
            }
            tokio::time::sleep(delay).await;
            write_response(&mut stream, status, &body).await;
            let _ = stream.shutdown().await;
            Some(captured)
        }
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some(captured)
        }
        Reply::Silent => {
            read_body(&mut stream, &mut tmp, &mut captured, content_length, keep, &received).await;
            // Wait for the client to give up.
            while let Ok(n) = stream.read(&mut tmp).await {
                if n == 0 {
                    break;
                }
            }
            Some(captured)
        }
    }
}

/// Returns `false` if the client closed before the body was complete.
async fn read_body(
    stream: &mut TcpStream,
    tmp: &mut [u8],
    captured: &mut Captured,
    content_length: u64,
    keep: bool,
    received: &AtomicU64,
) -> bool {
    while captured.body_len < content_length {
        let n = stream.read(tmp).await.unwrap_or(0);
        if n == 0 {
            return false;
        }
        record(captured, &tmp[..n], keep, received);
    }
    true
}

fn record(captured: &mut Captured, data: &[u8], keep: bool, received: &AtomicU64) {
    captured.body_len += data.len() as u64;
    received.fetch_add(data.len() as u64, Ordering::SeqCst);
    if keep {
        captured.body.extend_from_slice(data);
    }
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// A success body carrying one entry.
pub(crate) fn entry_body(id: u64, name: &str) -> String {
    format!(r#"{{"status":"success","fileEntry":{{"id":{id},"name":"{name}","type":"file"}}}}"#)
}

/// Finds `needle` in `haystack`.
pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
