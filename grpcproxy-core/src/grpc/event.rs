use crate::error::{ErrorKind, ErrorPayload, Stage};
use prost_reflect::DynamicMessage;
use std::error::Error as _;
use std::time::Duration;
use tonic::{Code, Status, metadata::MetadataMap};

/// One step of an invocation's lifecycle.
///
/// The events of one invocation arrive in order and always end with exactly one
/// [`InvocationEvent::Status`].
#[derive(Debug, Clone)]
pub enum InvocationEvent {
    /// Response headers sent by the peer.
    Headers(MetadataMap),
    /// One response message, in arrival order.
    Message(DynamicMessage),
    /// Response trailers sent by the peer.
    Trailers(MetadataMap),
    /// The terminal outcome of the call.
    Status(CallStatus),
}

/// The terminal outcome of an invocation, either reported by the peer or synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatus {
    code: Code,
    message: String,
    kind: Option<ErrorKind>,
}

impl CallStatus {
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
            kind: None,
        }
    }

    /// A status produced by this side of the call rather than by the peer.
    pub fn local(kind: ErrorKind, code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: Some(kind),
        }
    }

    pub fn canceled(reason: &str) -> Self {
        Self::local(ErrorKind::Canceled, Code::Cancelled, reason)
    }

    pub fn deadline_exceeded(timeout: Duration) -> Self {
        Self::local(
            ErrorKind::DeadlineExceeded,
            Code::DeadlineExceeded,
            format!("call did not complete within {timeout:?}"),
        )
    }

    /// Classifies a status returned by `tonic`.
    ///
    /// `tonic` attaches the underlying error as the source of statuses it builds from transport
    /// failures, while statuses read from the peer's trailers have none.
    pub fn from_status(status: &Status) -> Self {
        let kind = match status.code() {
            Code::Ok => None,
            Code::Cancelled => Some(ErrorKind::Canceled),
            Code::DeadlineExceeded => Some(ErrorKind::DeadlineExceeded),
            _ if status.source().is_some() => Some(ErrorKind::TransportError),
            _ => Some(ErrorKind::PeerRejected),
        };

        Self {
            code: status.code(),
            message: status.message().to_string(),
            kind,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure classification, `None` on success.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    /// The error payload reported to the caller, `None` on success.
    pub fn payload(&self) -> Option<ErrorPayload> {
        let kind = self.kind?;
        Some(ErrorPayload {
            stage: Stage::Invoke,
            kind,
            code: Some(format!("{:?}", self.code)),
            message: self.message.clone(),
        })
    }
}
