//! # Dynamic Invoker
//!
//! Drives one RPC exchange built entirely from runtime descriptors.
//!
//! ## How it works
//!
//! Every call shape (unary, server streaming, client streaming, bidirectional) goes through the
//! same bidirectional `tonic` exchange: the request side is a stream that yields one message for
//! unary-input methods and one message per item otherwise, and the response side is drained
//! message by message. The HTTP/2 framing is identical for all four shapes, so there is a single
//! code path for ordering, backpressure and termination.
//!
//! The exchange runs on its own task and reports progress through a bounded channel as
//! [`InvocationEvent`]s:
//!
//! * **Sending**: request messages are pulled from the lazy decoder only when the transport can
//!   accept them. The request side is half-closed once the input is exhausted, or as soon as an
//!   item fails to decode.
//! * **Receiving**: headers, then every response message in arrival order, then trailers.
//! * **Closed**: exactly one [`InvocationEvent::Status`]. The event sink is consumed when the
//!   status is emitted, so nothing can follow it.
//!
//! Cancelling through the [`CancelHandle`], hitting the deadline, or dropping the [`Invocation`]
//! stops the exchange: the underlying HTTP/2 stream is reset and the connection released.
use super::{
    codec::DynamicCodec,
    event::{CallStatus, InvocationEvent},
};
use crate::{
    BoxError,
    error::ErrorKind,
    json::decoder::{DecodeError, RequestMessages},
    schema::MethodShape,
};
use futures_util::Stream;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::{
    pin::Pin,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    Code,
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

/// Events buffered between the exchange task and the consumer before the task suspends.
const EVENT_BUFFER: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum InvokeError {
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Custom gRPC metadata (headers) to attach to the request.
    pub headers: Vec<(String, String)>,
    /// Deadline for the whole exchange. Sent as `grpc-timeout` and enforced locally.
    pub timeout: Option<Duration>,
}

/// Performs one dynamic call over a transport.
///
/// The invoker is consumed by [`DynamicInvoker::invoke`]: a connection serves exactly one call.
pub struct DynamicInvoker<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> DynamicInvoker<S>
where
    S: GrpcService<tonic::body::Body> + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Starts the call and returns the stream of its events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn invoke(
        self,
        method: MethodDescriptor,
        messages: RequestMessages,
        options: InvokeOptions,
    ) -> Result<Invocation, InvokeError> {
        let (failure_tx, failure_rx) = oneshot::channel();
        let outbound = Outbound {
            messages,
            failure: Some(failure_tx),
            sent: 0,
        };

        let mut request = build_request(outbound, options.headers)?;
        if let Some(timeout) = options.timeout {
            request.set_timeout(timeout);
        }

        let shape = MethodShape::of(&method);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancelHandle {
            notify: Arc::new(Notify::new()),
            requested: Arc::new(AtomicBool::new(false)),
        };

        let exchange = Exchange {
            client: self.client,
            method,
            request,
            failure: failure_rx,
            timeout: options.timeout,
            sink: EventSink(events_tx),
            cancel: cancel.notify.clone(),
        };
        tokio::spawn(exchange.run());

        Ok(Invocation {
            events: ReceiverStream::new(events_rx),
            cancel,
            shape,
        })
    }
}

/// The event stream of one running call.
///
/// Dropping it cancels the call.
#[derive(Debug)]
pub struct Invocation {
    events: ReceiverStream<InvocationEvent>,
    cancel: CancelHandle,
    shape: MethodShape,
}

impl Invocation {
    pub fn shape(&self) -> MethodShape {
        self.shape
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Stream for Invocation {
    type Item = InvocationEvent;

    /// Once the call is cancelled, events still buffered from before the cancellation are
    /// discarded and the terminal status reads `Canceled`.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let event = match Pin::new(&mut self.events).poll_next(cx) {
                Poll::Ready(Some(event)) => event,
                other => return other,
            };

            if !self.cancel.is_requested() {
                return Poll::Ready(Some(event));
            }

            if let InvocationEvent::Status(status) = event {
                let status = if status.kind() == Some(ErrorKind::Canceled) {
                    status
                } else {
                    CallStatus::canceled("invocation canceled")
                };
                return Poll::Ready(Some(InvocationEvent::Status(status)));
            }
        }
    }
}

/// Cancels a running [`Invocation`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
    requested: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Stops the call. The invocation then ends with a `Canceled` status and emits no further
    /// messages, including those already received but not yet consumed.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

struct EventSink(mpsc::Sender<InvocationEvent>);

/// The consumer of the events is gone.
struct Disconnected;

impl EventSink {
    async fn emit(&self, event: InvocationEvent) -> Result<(), Disconnected> {
        self.0.send(event).await.map_err(|_| Disconnected)
    }

    async fn closed(&self) {
        self.0.closed().await
    }

    async fn finish(self, status: CallStatus) {
        let _ = self.0.send(InvocationEvent::Status(status)).await;
    }
}

/// Request side of the exchange: pulls messages from the lazy decoder on demand.
struct Outbound {
    messages: RequestMessages,
    failure: Option<oneshot::Sender<DecodeError>>,
    sent: usize,
}

impl Stream for Outbound {
    type Item = DynamicMessage;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        match this.messages.next() {
            Some(Ok(message)) => {
                this.sent += 1;
                Poll::Ready(Some(message))
            }
            Some(Err(err)) => {
                tracing::warn!(sent = this.sent, error = %err, "half-closing at undecodable request item");
                if let Some(failure) = this.failure.take() {
                    let _ = failure.send(err);
                }
                Poll::Ready(None)
            }
            None => {
                tracing::debug!(sent = this.sent, "request stream exhausted, half-closing");
                Poll::Ready(None)
            }
        }
    }
}

struct Exchange<S> {
    client: tonic::client::Grpc<S>,
    method: MethodDescriptor,
    request: tonic::Request<Outbound>,
    failure: oneshot::Receiver<DecodeError>,
    timeout: Option<Duration>,
    sink: EventSink,
    cancel: Arc<Notify>,
}

impl<S> Exchange<S>
where
    S: GrpcService<tonic::body::Body> + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    async fn run(self) {
        let Exchange {
            mut client,
            method,
            request,
            mut failure,
            timeout,
            sink,
            cancel,
        } = self;

        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let status = tokio::select! {
            biased;
            _ = cancel.notified() => CallStatus::canceled("invocation canceled"),
            _ = sink.closed() => CallStatus::canceled("event consumer went away"),
            _ = deadline => CallStatus::deadline_exceeded(timeout.unwrap_or_default()),
            status = exchange(&mut client, &method, request, &sink) => status,
        };

        // A request item that failed to decode is the root cause of whatever the peer did next.
        let status = match (status.kind(), failure.try_recv()) {
            (Some(ErrorKind::Canceled | ErrorKind::DeadlineExceeded), _) => status,
            (_, Ok(err)) => {
                CallStatus::local(ErrorKind::DecodeError, Code::InvalidArgument, err.to_string())
            }
            (_, Err(_)) => status,
        };

        if status.is_ok() {
            tracing::info!(method = method.full_name(), "call completed");
        } else {
            tracing::warn!(
                method = method.full_name(),
                code = ?status.code(),
                kind = ?status.kind(),
                message = status.message(),
                "call failed"
            );
        }

        sink.finish(status).await;
    }
}

async fn exchange<S>(
    client: &mut tonic::client::Grpc<S>,
    method: &MethodDescriptor,
    request: tonic::Request<Outbound>,
    sink: &EventSink,
) -> CallStatus
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    if let Err(e) = client.ready().await {
        let e: BoxError = e.into();
        return CallStatus::local(
            ErrorKind::TransportError,
            Code::Unavailable,
            format!("transport not ready: {e}"),
        );
    }

    let codec = DynamicCodec::new(method.output());
    let path = http_path(method);

    let response = match client.streaming(request, path, codec).await {
        Ok(response) => response,
        Err(status) => return terminate(status, sink).await,
    };

    let (headers, mut inbound, _) = response.into_parts();
    if sink.emit(InvocationEvent::Headers(headers)).await.is_err() {
        return CallStatus::canceled("event consumer went away");
    }

    let mut received = 0usize;
    loop {
        match inbound.message().await {
            Ok(Some(message)) => {
                received += 1;
                if sink.emit(InvocationEvent::Message(message)).await.is_err() {
                    return CallStatus::canceled("event consumer went away");
                }
            }
            Ok(None) => break,
            Err(status) => {
                tracing::debug!(received, "response stream failed");
                return terminate(status, sink).await;
            }
        }
    }

    match inbound.trailers().await {
        Ok(Some(trailers)) => {
            if sink.emit(InvocationEvent::Trailers(trailers)).await.is_err() {
                return CallStatus::canceled("event consumer went away");
            }
        }
        Ok(None) => {}
        Err(status) => return terminate(status, sink).await,
    }

    tracing::debug!(received, "response stream completed");
    CallStatus::ok()
}

/// Surfaces the trailers carried by a failed status before classifying it.
async fn terminate(status: tonic::Status, sink: &EventSink) -> CallStatus {
    let call_status = CallStatus::from_status(&status);

    if call_status.kind() != Some(ErrorKind::TransportError) {
        let trailers = status.metadata().clone();
        if sink.emit(InvocationEvent::Trailers(trailers)).await.is_err() {
            return CallStatus::canceled("event consumer went away");
        }
    }

    call_status
}

fn http_path(method: &MethodDescriptor) -> http::uri::PathAndQuery {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
}

fn build_request<T>(
    payload: T,
    headers: Vec<(String, String)>,
) -> Result<tonic::Request<T>, InvokeError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key = MetadataKey::from_str(&k).map_err(|source| InvokeError::InvalidMetadataKey {
            key: k.clone(),
            source,
        })?;
        let val = MetadataValue::from_str(&v)
            .map_err(|source| InvokeError::InvalidMetadataValue { key: k, source })?;
        request.metadata_mut().append(key, val);
    }
    Ok(request)
}
