//! # Error taxonomy
//!
//! Every stage of the pipeline has its own error enum. [`GatewayError`] aggregates them and
//! classifies each one into an [`ErrorKind`] and the [`Stage`] it happened in, which is what
//! callers see in the JSON error payload.
use crate::{
    connection::ConnectError, grpc::invoker::InvokeError, json::decoder::DecodeError,
    schema::ResolveError,
};
use serde::Serialize;
use std::fmt;

/// Classification of a failed invocation, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ConnectionTimeout,
    ReflectionUnsupported,
    #[serde(rename = "ReflectionIOError")]
    ReflectionIo,
    SchemaParseError,
    MethodNotFound,
    DecodeError,
    TransportError,
    DeadlineExceeded,
    Canceled,
    PeerRejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionTimeout => "ConnectionTimeout",
            ErrorKind::ReflectionUnsupported => "ReflectionUnsupported",
            ErrorKind::ReflectionIo => "ReflectionIOError",
            ErrorKind::SchemaParseError => "SchemaParseError",
            ErrorKind::MethodNotFound => "MethodNotFound",
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::DeadlineExceeded => "DeadlineExceeded",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::PeerRejected => "PeerRejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline stage a failure was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The gateway request itself could not be understood.
    Request,
    Connect,
    Resolve,
    Decode,
    Invoke,
}

/// The body of every error the gateway reports, wrapped as `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub stage: Stage,
    pub kind: ErrorKind,
    /// gRPC status code name, present when the failure carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl ErrorPayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }
}

/// Any error that aborts an invocation before its event sequence starts.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Symbol '{0}' not found")]
    SymbolNotFound(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest(_) => ErrorKind::DecodeError,
            GatewayError::Connect(ConnectError::Timeout { .. }) => ErrorKind::ConnectionTimeout,
            GatewayError::Connect(_) => ErrorKind::TransportError,
            GatewayError::Resolve(err) => err.kind(),
            GatewayError::SymbolNotFound(_) => ErrorKind::MethodNotFound,
            GatewayError::Decode(err) => err.kind(),
            GatewayError::Invoke(_) => ErrorKind::DecodeError,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            GatewayError::InvalidRequest(_) => Stage::Request,
            GatewayError::Connect(_) => Stage::Connect,
            GatewayError::Resolve(_) | GatewayError::SymbolNotFound(_) => Stage::Resolve,
            GatewayError::Decode(_) => Stage::Decode,
            GatewayError::Invoke(_) => Stage::Invoke,
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            stage: self.stage(),
            kind: self.kind(),
            code: None,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::client::ReflectionResolveError;
    use std::time::Duration;

    #[test]
    fn kinds_serialize_with_their_public_names() {
        let names: Vec<_> = [
            ErrorKind::ConnectionTimeout,
            ErrorKind::ReflectionUnsupported,
            ErrorKind::ReflectionIo,
            ErrorKind::SchemaParseError,
            ErrorKind::MethodNotFound,
            ErrorKind::DecodeError,
            ErrorKind::TransportError,
            ErrorKind::DeadlineExceeded,
            ErrorKind::Canceled,
            ErrorKind::PeerRejected,
        ]
        .into_iter()
        .map(|kind| (serde_json::to_value(kind).unwrap(), kind.as_str()))
        .collect();

        for (serialized, name) in names {
            assert_eq!(serialized, serde_json::Value::String(name.to_string()));
        }
    }

    #[test]
    fn classifies_pipeline_errors() {
        let timeout = GatewayError::from(ConnectError::Timeout {
            address: "localhost:1".into(),
            timeout: Duration::from_secs(10),
        });
        assert_eq!(timeout.kind(), ErrorKind::ConnectionTimeout);
        assert_eq!(timeout.stage(), Stage::Connect);

        let unsupported = GatewayError::from(ResolveError::from(
            ReflectionResolveError::Unsupported,
        ));
        assert_eq!(unsupported.kind(), ErrorKind::ReflectionUnsupported);
        assert_eq!(unsupported.stage(), Stage::Resolve);

        let io = GatewayError::from(ResolveError::from(ReflectionResolveError::StreamClosed));
        assert_eq!(io.kind(), ErrorKind::ReflectionIo);

        let missing = GatewayError::from(DecodeError::MethodNotFound("a.B/C".into()));
        assert_eq!(missing.kind(), ErrorKind::MethodNotFound);
        assert_eq!(missing.stage(), Stage::Decode);
    }

    #[test]
    fn payload_is_wrapped_in_error_object() {
        let payload = GatewayError::InvalidRequest("missing field `address`".into()).payload();

        assert_eq!(
            payload.to_json(),
            serde_json::json!({
                "error": {
                    "stage": "request",
                    "kind": "DecodeError",
                    "message": "Invalid request: missing field `address`"
                }
            })
        );
    }
}
