//! Streaming uploads for PrismDrive.
//!
//! A transfer moves through four stages, each owning the source handle in
//! turn:
//!
//! 1. [`ByteSourceHandle`] opens the local file and fixes its length.
//! 2. [`ProgressTap`] wraps it and reports every chunk read.
//! 3. [`TransferRequestBuilder`] validates the request and produces a
//!    [`RequestDescriptor`]; [`TransferExecutor`] streams it and classifies
//!    the answer.
//! 4. [`CompletionReconciler`] closes the handle and turns the raw result
//!    into a [`TransferOutcome`].

mod error;
mod executor;
mod progress;
mod reconcile;
mod request;
mod source;
mod types;
mod validation;

#[cfg(test)]
mod testing;

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use error::{FailureKind, TransferError};
pub use executor::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_WRITE_IDLE_TIMEOUT, Execution,
    ExecutorConfig, TransferExecutor,
};
pub use progress::{ProgressCallback, ProgressTap, SpeedCalculator};
pub use reconcile::CompletionReconciler;
pub use request::{Rejected, RequestDescriptor, TransferRequestBuilder};
pub use source::{ByteSource, ByteSourceHandle, FileSource, ReadFuture};
pub use types::{
    Destination, FailureReport, ProgressEvent, RemoteTarget, TransferFailure, TransferOutcome,
    TransferRequest, TransferResult,
};
pub use validation::{validate_file_name, validate_relative_path};

pub use prismdrive_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Uploads `local_path` to `destination`.
///
/// `on_progress(transferred, total)` is called on the calling task for
/// every chunk, and never after this returns. Cancelling `cancel` aborts
/// the request and yields a [`FailureKind::Cancelled`] outcome.
pub async fn upload<F>(
    executor: &TransferExecutor,
    target: &RemoteTarget,
    local_path: &Path,
    destination: &Destination,
    on_progress: F,
    cancel: &CancellationToken,
) -> TransferOutcome
where
    F: FnMut(u64, u64) + Send,
{
    let handle = match ByteSourceHandle::open(local_path).await {
        Ok(handle) => handle,
        Err(e) => {
            let failure = TransferFailure::from(e);
            debug!(path = %local_path.display(), error = %failure.message, "cannot open source");
            return TransferOutcome::Failed(FailureReport {
                kind: failure.kind,
                status: None,
                message: reconcile::user_message(&failure, 0, 0),
                details: Vec::new(),
                bytes_sent: 0,
                total_bytes: 0,
            });
        }
    };

    let request = TransferRequest::new(local_path, handle.size()).to(destination);
    upload_source(executor, target, request, handle, on_progress, cancel).await
}

/// Uploads an already opened source.
///
/// The handle is closed exactly once whatever the outcome.
pub async fn upload_source<F>(
    executor: &TransferExecutor,
    target: &RemoteTarget,
    request: TransferRequest,
    handle: ByteSourceHandle,
    mut on_progress: F,
    cancel: &CancellationToken,
) -> TransferOutcome
where
    F: FnMut(u64, u64) + Send,
{
    let reconciler = CompletionReconciler;
    let tap = ProgressTap::new(handle, move |event: ProgressEvent| {
        on_progress(event.transferred, event.total)
    });

    let descriptor = match TransferRequestBuilder::new(request).build(tap) {
        Ok(descriptor) => descriptor,
        Err(Rejected { error, tap }) => {
            return reconciler.reconcile(error.into(), tap.into_handle());
        }
    };

    let Execution { result, handle } = executor.execute(descriptor, target, cancel).await;
    reconciler.reconcile(result, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, Reply, ScriptedSource, SourceProbe, entry_body, pattern};
    use prismdrive_protocol::Token;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    const CHUNK: usize = 64 * 1024;

    fn executor() -> TransferExecutor {
        TransferExecutor::new(ExecutorConfig {
            chunk_size: CHUNK,
            response_timeout: Duration::from_secs(10),
            ..ExecutorConfig::default()
        })
        .unwrap()
    }

    fn target(server: &MockServer, token: &str) -> RemoteTarget {
        RemoteTarget::new(server.url.clone(), Token::new(token).unwrap())
    }

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    type Events = Arc<Mutex<Vec<(u64, u64)>>>;

    fn recorder() -> (Events, impl FnMut(u64, u64) + Send + 'static) {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        (events, move |sent, total| sink.lock().unwrap().push((sent, total)))
    }

    fn scripted(size: u64) -> (TransferRequest, ByteSourceHandle, Arc<SourceProbe>) {
        let (source, probe) = ScriptedSource::patterned(size);
        let handle = ByteSourceHandle::new(source, "scripted");
        (TransferRequest::new("scripted.bin", size), handle, probe)
    }

    #[tokio::test]
    async fn uploads_file_and_reports_progress_to_total() {
        let content = pattern(300 * 1024);
        let file = temp_file(&content);
        let server = MockServer::start(Reply::json(201, &entry_body(11, "x.bin"))).await;
        let (events, on_progress) = recorder();

        let outcome = upload(
            &executor(),
            &target(&server, "tok"),
            file.path(),
            &Destination::folder(4),
            on_progress,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.entry().map(|e| e.id), Some(11));
        let TransferOutcome::Completed { bytes, .. } = outcome else {
            unreachable!();
        };
        assert_eq!(bytes, content.len() as u64);

        let events = events.lock().unwrap();
        assert!(!events.is_empty());
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(*events.last().unwrap(), (bytes, bytes));
        assert!(events.iter().all(|&(_, total)| total == bytes));

        let captured = server.captured().await;
        assert_eq!(captured.header("authorization").as_deref(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn zero_byte_file_emits_one_event_and_succeeds() {
        let file = temp_file(b"");
        let server = MockServer::start(Reply::json(201, &entry_body(1, "empty.bin"))).await;
        let (events, on_progress) = recorder();

        let outcome = upload(
            &executor(),
            &target(&server, "tok"),
            file.path(),
            &Destination::root(),
            on_progress,
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(*events.lock().unwrap(), vec![(0, 0)]);
        let captured = server.captured().await;
        assert!(captured.header("content-length").is_some());
    }

    #[tokio::test]
    async fn missing_file_fails_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start(Reply::json(201, &entry_body(1, "x"))).await;
        let (events, on_progress) = recorder();

        let outcome = upload(
            &executor(),
            &target(&server, "tok"),
            &dir.path().join("gone.bin"),
            &Destination::root(),
            on_progress,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::IoError));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(server.received.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_progress_after_delayed_result() {
        let server = MockServer::start(Reply::delayed(
            201,
            &entry_body(2, "d.bin"),
            Duration::from_millis(300),
        ))
        .await;
        let (request, handle, probe) = scripted(200 * 1024);
        let (events, on_progress) = recorder();

        let started = Instant::now();
        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            request,
            handle,
            on_progress,
            &CancellationToken::new(),
        )
        .await;
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(outcome.is_success());

        let count = events.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(events.lock().unwrap().len(), count);
        assert_eq!(events.lock().unwrap().last().copied(), Some((200 * 1024, 200 * 1024)));
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn handle_closed_once_for_every_outcome() {
        let replies = vec![
            Reply::json(201, &entry_body(1, "a")),
            Reply::json(401, r#"{"message":"Unauthenticated."}"#),
            Reply::json(422, r#"{"message":"bad","errors":{"file":["bad"]}}"#),
            Reply::json(403, "forbidden"),
            Reply::json(500, "boom"),
            Reply::json(200, "not json"),
            Reply::DropAfter(1024),
        ];
        for reply in replies {
            let server = MockServer::start(reply).await;
            let (request, handle, probe) = scripted(512 * 1024);
            let _ = upload_source(
                &executor(),
                &target(&server, "tok"),
                request,
                handle,
                |_, _| {},
                &CancellationToken::new(),
            )
            .await;
            probe.assert_closed_once();
        }

        // Cancelled before start.
        let server = MockServer::start(Reply::json(201, &entry_body(1, "a"))).await;
        let (request, handle, probe) = scripted(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            request,
            handle,
            |_, _| {},
            &cancel,
        )
        .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        probe.assert_closed_once();

        // Rejected before sending.
        let (source, probe) = ScriptedSource::patterned(10);
        let handle = ByteSourceHandle::new(source, "scripted");
        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            TransferRequest::new("a.bin", 10).with_relative_path(Some("../up".into())),
            handle,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ValidationError));
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn length_mismatch_fails_fast() {
        let server = MockServer::start(Reply::json(201, &entry_body(1, "a"))).await;
        let (source, probe) = ScriptedSource::patterned(10);
        let handle = ByteSourceHandle::new(source, "scripted");
        let (events, on_progress) = recorder();

        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            TransferRequest::new("a.bin", 12),
            handle,
            on_progress,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::ValidationError));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(probe.bytes_read(), 0);
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn truncated_source_aborts_as_io_error() {
        let server = MockServer::start(Reply::json(201, &entry_body(1, "a"))).await;
        let (source, probe) = ScriptedSource::patterned(400 * 1024);
        let source = source.truncated_at(100 * 1024);
        let handle = ByteSourceHandle::new(source, "scripted");

        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            TransferRequest::new("a.bin", 400 * 1024),
            handle,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::IoError));
        assert_eq!(outcome.failure().unwrap().bytes_sent, 100 * 1024);
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn read_ahead_stays_bounded_for_endless_source() {
        const DECLARED: u64 = 48 * 1024 * 1024;
        let server = MockServer::start(Reply::json(201, &entry_body(9, "big.bin"))).await;
        let (source, probe) = ScriptedSource::unbounded(DECLARED);
        let source = source.tracking_backlog(Arc::clone(&server.received));
        let handle = ByteSourceHandle::new(source, "endless");

        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            TransferRequest::new("big.bin", DECLARED),
            handle,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(probe.bytes_read(), DECLARED);
        assert!(probe.max_request() <= CHUNK);
        assert!(
            probe.max_backlog() <= 24 * 1024 * 1024,
            "read ahead of the server by {} bytes",
            probe.max_backlog()
        );
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn cancel_mid_transfer_stops_reading() {
        const SIZE: u64 = 32 * 1024 * 1024;
        let server = MockServer::start(Reply::json(201, &entry_body(1, "a"))).await;
        let (request, handle, probe) = scripted(SIZE);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);

        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            request,
            handle,
            move |sent, total| {
                sink.lock().unwrap().push((sent, total));
                if sent >= 1024 * 1024 {
                    trigger.cancel();
                }
            },
            &cancel,
        )
        .await;

        let report = outcome.failure().unwrap();
        assert_eq!(report.kind, FailureKind::Cancelled);
        assert!(report.bytes_sent < SIZE);
        assert_eq!(events.lock().unwrap().last().unwrap().0, report.bytes_sent);
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn unauthorized_mid_stream_stops_streaming() {
        const SIZE: u64 = 64 * 1024 * 1024;
        let server = MockServer::start(Reply::early(401, r#"{"message":"Unauthenticated."}"#)).await;
        let (request, handle, probe) = scripted(SIZE);

        let outcome = upload_source(
            &executor(),
            &target(&server, "expired"),
            request,
            handle,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await;

        let report = outcome.failure().unwrap();
        assert_eq!(report.kind, FailureKind::Unauthorized);
        assert_eq!(report.status, Some(401));
        assert!(report.bytes_sent < SIZE);
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn connection_drop_mid_body_is_transient() {
        let server = MockServer::start(Reply::DropAfter(256 * 1024)).await;
        let (request, handle, probe) = scripted(8 * 1024 * 1024);

        let outcome = upload_source(
            &executor(),
            &target(&server, "tok"),
            request,
            handle,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await;

        let report = outcome.failure().unwrap();
        assert_eq!(report.kind, FailureKind::TransientError);
        assert!(report.is_retryable());
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn server_that_stops_reading_times_out() {
        const SIZE: u64 = 256 * 1024 * 1024;
        let server = MockServer::start(Reply::Stall).await;
        let (request, handle, probe) = scripted(SIZE);
        let executor = TransferExecutor::new(ExecutorConfig {
            chunk_size: CHUNK,
            write_idle_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
            ..ExecutorConfig::default()
        })
        .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            upload_source(
                &executor,
                &target(&server, "tok"),
                request,
                handle,
                |_, _| {},
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("stalled upload must end with a result");

        let report = outcome.failure().unwrap();
        assert_eq!(report.kind, FailureKind::TransientError);
        assert!(report.message.contains("stopped reading"), "{}", report.message);
        assert!(report.bytes_sent < SIZE);
        probe.assert_closed_once();
    }

    #[tokio::test]
    async fn concurrent_transfers_keep_their_own_credentials() {
        let first = MockServer::start(Reply::json(201, &entry_body(1, "one.bin"))).await;
        let second = MockServer::start(Reply::json(201, &entry_body(2, "two.bin"))).await;
        let executor = executor();
        let (req_a, handle_a, probe_a) = scripted(300 * 1024);
        let (req_b, handle_b, probe_b) = scripted(100 * 1024);
        let target_a = target(&first, "token-a");
        let target_b = target(&second, "token-b");
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            upload_source(&executor, &target_a, req_a, handle_a, |_, _| {}, &cancel),
            upload_source(&executor, &target_b, req_b, handle_b, |_, _| {}, &cancel),
        );

        assert_eq!(a.entry().map(|e| e.id), Some(1));
        assert_eq!(b.entry().map(|e| e.id), Some(2));
        probe_a.assert_closed_once();
        probe_b.assert_closed_once();

        let a = first.captured().await;
        let b = second.captured().await;
        assert_eq!(a.header("authorization").as_deref(), Some("Bearer token-a"));
        assert_eq!(b.header("authorization").as_deref(), Some("Bearer token-b"));
    }
}
