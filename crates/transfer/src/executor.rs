//! Sends one upload request and classifies the answer.

use std::error::Error as _;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use prismdrive_protocol::constants::{OCTET_STREAM, USER_AGENT};
use prismdrive_protocol::{ApiErrorBody, decode_entry, summarize_error};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::progress::ProgressTap;
use crate::request::RequestDescriptor;
use crate::source::ByteSourceHandle;
use crate::{
    DEFAULT_CHUNK_SIZE, FailureKind, RemoteTarget, TransferError, TransferFailure,
    TransferResult,
};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time a body chunk may wait for the server to read it.
pub const DEFAULT_WRITE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed for the server to answer once the body is sent.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bytes requested from the source per read. `0` means
    /// [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    /// How long one chunk may wait for the transport to take it.
    pub write_idle_timeout: Duration,
    /// Starts after the last body byte has been handed to the transport.
    pub response_timeout: Duration,
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_idle_timeout: DEFAULT_WRITE_IDLE_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// What the executor hands back: the raw result and the source handle,
/// which the reconciler must close.
#[derive(Debug)]
pub struct Execution {
    pub result: TransferResult,
    pub handle: ByteSourceHandle,
}

/// Streams a [`RequestDescriptor`] to the server.
///
/// Holds no per-transfer state; one executor can run many transfers at
/// once, each against its own [`RemoteTarget`].
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    http: reqwest::Client,
    config: ExecutorConfig,
}

impl TransferExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn chunk_size(&self) -> usize {
        match self.config.chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        }
    }

    /// Runs the transfer to a single terminal result.
    ///
    /// Body chunks are read only when the transport has room for them, so
    /// at most one chunk waits between the source and the connection.
    /// Every progress event is emitted before this returns.
    pub async fn execute(
        &self,
        descriptor: RequestDescriptor<'_>,
        target: &RemoteTarget,
        cancel: &CancellationToken,
    ) -> Execution {
        let RequestDescriptor {
            method,
            endpoint,
            fields,
            file_field,
            file_name,
            content_length,
            mut tap,
        } = descriptor;

        let url = target.url(endpoint);
        info!(
            url = %url,
            file = %file_name,
            bytes = content_length,
            "starting streaming upload"
        );

        let (tx, rx) = mpsc::channel(1);
        let body = reqwest::Body::wrap_stream(ChunkStream(rx));
        let part = match Part::stream_with_length(body, content_length)
            .file_name(file_name)
            .mime_str(OCTET_STREAM)
        {
            Ok(part) => part,
            Err(e) => {
                return Execution {
                    result: TransferError::from(e).into(),
                    handle: tap.into_handle(),
                };
            }
        };

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        let form = form.part(file_field, part);

        let send = self
            .http
            .request(method, url)
            .bearer_auth(target.token().expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send();

        let result = self.drive(send, &mut tap, tx, cancel).await;
        Execution {
            result,
            handle: tap.into_handle(),
        }
    }

    async fn drive(
        &self,
        send: impl Future<Output = reqwest::Result<reqwest::Response>>,
        tap: &mut ProgressTap<'_>,
        tx: mpsc::Sender<io::Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let response_timeout = self.config.response_timeout;
        let pump = pump_body(tap, tx, self.chunk_size(), self.config.write_idle_timeout);
        let deadline = tokio::time::sleep(response_timeout);
        tokio::pin!(send, pump, deadline);
        let mut pumping = true;

        let sent = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("upload cancelled");
                    return TransferResult::failure(FailureKind::Cancelled, "cancelled by user");
                }
                end = &mut pump, if pumping => {
                    pumping = false;
                    match end {
                        Ok(PumpEnd::Complete) => {
                            debug!("request body fully handed to transport");
                            deadline.as_mut().reset(Instant::now() + response_timeout);
                        }
                        Ok(PumpEnd::Abandoned) => {
                            debug!("transport stopped consuming the request body");
                            deadline.as_mut().reset(Instant::now() + response_timeout);
                        }
                        Err(e) => return e.into(),
                    }
                }
                sent = &mut send => break sent,
                _ = &mut deadline, if !pumping => {
                    return TransferResult::Failure(TransferFailure::new(
                        FailureKind::TransientError,
                        format!("no response within {response_timeout:?}"),
                    ));
                }
            }
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => return transport_failure(&e),
        };
        let status = response.status();
        debug!(status = status.as_u16(), "response received");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                TransferResult::failure(FailureKind::Cancelled, "cancelled by user")
            }
            body = tokio::time::timeout(response_timeout, response.bytes()) => match body {
                Ok(Ok(body)) => classify(status, &body),
                Ok(Err(e)) => transport_failure(&e),
                Err(_) => TransferResult::Failure(
                    TransferFailure::new(
                        FailureKind::TransientError,
                        "timed out reading the response body",
                    )
                    .with_status(status.as_u16()),
                ),
            }
        }
    }
}

enum PumpEnd {
    /// Every declared byte was handed to the transport.
    Complete,
    /// The transport dropped the body; the response future says why.
    Abandoned,
}

/// Moves chunks from the tap into the body channel, one at a time.
async fn pump_body(
    tap: &mut ProgressTap<'_>,
    tx: mpsc::Sender<io::Result<Bytes>>,
    chunk_size: usize,
    idle_timeout: Duration,
) -> Result<PumpEnd, TransferError> {
    loop {
        let chunk = tap.read_chunk(chunk_size).await?;
        if chunk.is_empty() {
            return Ok(PumpEnd::Complete);
        }
        match tokio::time::timeout(idle_timeout, tx.send(Ok(chunk))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Ok(PumpEnd::Abandoned),
            Err(_) => return Err(TransferError::Stalled(idle_timeout)),
        }
    }
}

/// Request body backed by the pump channel.
struct ChunkStream(mpsc::Receiver<io::Result<Bytes>>);

impl futures_util::Stream for ChunkStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

/// Maps a response onto a [`TransferResult`].
pub(crate) fn classify(status: StatusCode, body: &[u8]) -> TransferResult {
    let code = status.as_u16();

    if status.is_success() {
        return match decode_entry(body) {
            Ok(entry) => TransferResult::Success(entry),
            Err(e) => TransferResult::Failure(
                TransferFailure::new(
                    FailureKind::UnexpectedResponse,
                    format!("upload accepted but the response could not be read: {e}"),
                )
                .with_status(code),
            ),
        };
    }

    let message = summarize_error(code, body);
    let failure = match status {
        StatusCode::UNAUTHORIZED => TransferFailure::new(FailureKind::Unauthorized, message),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let details = ApiErrorBody::parse(body)
                .map(|b| b.field_errors())
                .unwrap_or_default();
            TransferFailure::new(FailureKind::ValidationError, message).with_details(details)
        }
        s if s.is_client_error() => TransferFailure::new(FailureKind::ClientError, message),
        s if s.is_server_error() => TransferFailure::new(FailureKind::TransientError, message),
        _ => TransferFailure::new(
            FailureKind::UnexpectedResponse,
            format!("unexpected HTTP status {code}"),
        ),
    };
    TransferResult::Failure(failure.with_status(code))
}

/// Maps a reqwest error raised while sending or reading.
fn transport_failure(err: &reqwest::Error) -> TransferResult {
    let kind = if err.is_builder() {
        FailureKind::ValidationError
    } else if err.is_redirect() {
        FailureKind::UnexpectedResponse
    } else {
        FailureKind::TransientError
    };
    debug!(error = %err, timeout = err.is_timeout(), connect = err.is_connect(), "transport error");
    TransferResult::failure(kind, error_chain(err))
}

/// Joins an error with its sources: `"error sending request: connection reset"`.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
