use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::source::ByteSourceHandle;
use crate::{ProgressEvent, TransferError};

/// Callback invoked for every chunk read from the source.
pub type ProgressCallback<'a> = Box<dyn FnMut(ProgressEvent) + Send + 'a>;

/// Wraps a [`ByteSourceHandle`] and reports every chunk read through it.
///
/// Events are emitted synchronously on the reading task, so they are
/// ordered and all of them precede the result of the transfer. The tap
/// never closes the handle; [`into_handle`](Self::into_handle) gives it
/// back once streaming is over.
pub struct ProgressTap<'a> {
    handle: ByteSourceHandle,
    on_progress: ProgressCallback<'a>,
    total: u64,
    transferred: u64,
    reported: bool,
    finished: bool,
}

impl<'a> ProgressTap<'a> {
    pub fn new(handle: ByteSourceHandle, on_progress: impl FnMut(ProgressEvent) + Send + 'a) -> Self {
        let total = handle.size();
        Self {
            handle,
            on_progress: Box::new(on_progress),
            total,
            transferred: 0,
            reported: false,
            finished: false,
        }
    }

    /// Declared length of the underlying source.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes read through the tap so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `true` until the first read.
    pub fn is_fresh(&self) -> bool {
        self.transferred == 0 && !self.reported && !self.finished
    }

    /// Reads the next chunk of at most `max_len` bytes.
    ///
    /// Returns an empty buffer exactly once, at end of stream. Never reads
    /// past the declared total even if the source has more.
    pub async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, TransferError> {
        if self.finished {
            return Err(TransferError::InvariantViolation(
                "read requested after end of stream".into(),
            ));
        }

        let remaining = self.total - self.transferred;
        if remaining == 0 {
            self.finished = true;
            if !self.reported {
                self.emit();
            }
            return Ok(Bytes::new());
        }

        let want = (max_len.max(1) as u64).min(remaining) as usize;
        let chunk = self.handle.read_chunk(want).await?;
        if chunk.is_empty() {
            self.finished = true;
            return Err(TransferError::SourceTruncated {
                read: self.transferred,
                expected: self.total,
            });
        }

        self.transferred += chunk.len() as u64;
        trace!(
            transferred = self.transferred,
            total = self.total,
            "chunk read"
        );
        self.emit();
        Ok(chunk)
    }

    /// Releases the handle for reconciliation.
    pub fn into_handle(self) -> ByteSourceHandle {
        self.handle
    }

    fn emit(&mut self) {
        self.reported = true;
        (self.on_progress)(ProgressEvent {
            transferred: self.transferred,
            total: self.total,
        });
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(100),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records `bytes` transferred since the previous sample.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&mut self, bytes: u64, now: Instant) {
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(self.window_size) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the window start; its bytes predate it.
        let bytes: u64 = self.samples[1..].iter().map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining_bytes`; `None` while speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
