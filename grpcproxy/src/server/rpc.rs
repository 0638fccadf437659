//! Streams a running invocation back as the HTTP response.
//!
//! The response status is only decided once the first response message or the terminal status
//! arrives: a failure before any message is a `400`, anything else is a `200` whose body is
//! written line by line as events arrive. Dropping the body (the caller went away) drops the
//! invocation, which cancels the call.
use super::bad_request;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::{Stream, StreamExt, stream};
use grpcproxy_core::{
    grpc::{Invocation, InvocationEvent},
    json::encoder::{EncodeError, ResponseEncoder},
    tonic::metadata::MetadataMap,
};
use std::convert::Infallible;

const JSON: &str = "application/json";
const NDJSON: &str = "application/x-ndjson";
const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

pub(super) async fn respond(invocation: Invocation, encoder: ResponseEncoder) -> Response {
    let server_streaming = invocation.shape().is_server_streaming();
    stream_events(invocation, server_streaming, encoder).await
}

async fn stream_events<E>(mut events: E, server_streaming: bool, encoder: ResponseEncoder) -> Response
where
    E: Stream<Item = InvocationEvent> + Send + Unpin + 'static,
{
    let content_type = if server_streaming { NDJSON } else { JSON };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));

    let first = loop {
        match events.next().await {
            Some(InvocationEvent::Headers(metadata)) => surface_metadata(&metadata, &mut headers),
            Some(InvocationEvent::Trailers(trailers)) => log_trailers(&trailers),
            Some(event @ InvocationEvent::Message(_)) => match encoder.encode(&event) {
                Ok(line) => break line,
                Err(err) => {
                    log_unrenderable(&err);
                    return bad_request(err.payload());
                }
            },
            Some(InvocationEvent::Status(status)) => {
                return match status.payload() {
                    Some(payload) => bad_request(payload),
                    None => (StatusCode::OK, headers).into_response(),
                };
            }
            None => return (StatusCode::OK, headers).into_response(),
        }
    };

    // An unrenderable message ends the body with an error line. The events are dropped with the
    // state, which cancels the call.
    let rest = stream::unfold(Some((events, encoder)), |state| async move {
        let (mut events, encoder) = state?;
        loop {
            let event = events.next().await?;
            if let InvocationEvent::Trailers(trailers) = &event {
                log_trailers(trailers);
            }
            match encoder.encode(&event) {
                Ok(Some(line)) => return Some((line, Some((events, encoder)))),
                Ok(None) => continue,
                Err(err) => {
                    log_unrenderable(&err);
                    return Some((encoder.encode_error(&err.payload()), None));
                }
            }
        }
    });

    let body = stream::iter(first)
        .chain(rest)
        .map(|line| Ok::<_, Infallible>(Bytes::from(line)));

    (StatusCode::OK, headers, Body::from_stream(body)).into_response()
}

/// Copies the peer's response headers as `grpc-metadata-<name>` HTTP headers.
///
/// Protocol headers (`content-type`, `te` and the `grpc-` family) are not metadata and stay
/// behind.
fn surface_metadata(metadata: &MetadataMap, headers: &mut HeaderMap) {
    for (name, value) in metadata.clone().into_headers().iter() {
        if is_reserved(name.as_str()) {
            continue;
        }
        let prefixed = format!("{METADATA_HEADER_PREFIX}{}", name.as_str());
        match HeaderName::from_bytes(prefixed.as_bytes()) {
            Ok(name) => {
                headers.append(name, value.clone());
            }
            Err(err) => tracing::debug!(header = %prefixed, error = %err, "skipping metadata"),
        }
    }
}

fn is_reserved(name: &str) -> bool {
    name == "content-type" || name == "te" || name.starts_with("grpc-")
}

fn log_trailers(trailers: &MetadataMap) {
    tracing::debug!(trailers = trailers.len(), "received trailers");
}

fn log_unrenderable(err: &EncodeError) {
    tracing::warn!(error = %err, "ending response on an unrenderable message");
}
