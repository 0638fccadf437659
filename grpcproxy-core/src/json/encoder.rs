//! # Response Encoder
//!
//! Turns invocation events into the bytes written back to the HTTP caller.
//!
//! Messages are rendered as JSON objects keyed by the field names declared in the schema
//! (not their lowerCamelCase JSON names), with default values included. Each rendered event is
//! one line, so a streamed response body is newline-delimited JSON.
use crate::{
    error::{ErrorKind, ErrorPayload, Stage},
    grpc::InvocationEvent,
};
use prost_reflect::{DynamicMessage, ReflectMessage, SerializeOptions};
use serde_json::Value;

/// A response message that has no JSON rendering, such as an `Any` whose type is not in the
/// schema.
#[derive(Debug, thiserror::Error)]
#[error("Failed to render response message '{message}' as JSON: {source}")]
pub struct EncodeError {
    message: String,
    #[source]
    source: serde_json::Error,
}

impl EncodeError {
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            stage: Stage::Invoke,
            kind: ErrorKind::DecodeError,
            code: None,
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseEncoder {
    options: SerializeOptions,
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self {
            options: SerializeOptions::new()
                .use_proto_field_name(true)
                .skip_default_fields(false),
        }
    }
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders one message as a JSON value.
    pub fn to_json(&self, message: &DynamicMessage) -> Result<Value, serde_json::Error> {
        message.serialize_with_options(serde_json::value::Serializer, &self.options)
    }

    /// Renders the line written for `event`, if any.
    ///
    /// Messages and failed statuses produce a line; headers, trailers and a successful status do
    /// not. A message that cannot be rendered is an error, never a skipped line.
    pub fn encode(&self, event: &InvocationEvent) -> Result<Option<Vec<u8>>, EncodeError> {
        let value = match event {
            InvocationEvent::Message(message) => {
                self.to_json(message).map_err(|source| EncodeError {
                    message: message.descriptor().full_name().to_string(),
                    source,
                })?
            }
            InvocationEvent::Status(status) => match status.payload() {
                Some(payload) => payload.to_json(),
                None => return Ok(None),
            },
            InvocationEvent::Headers(_) | InvocationEvent::Trailers(_) => return Ok(None),
        };

        Ok(Some(line(&value)))
    }

    /// Renders an error payload as a line.
    pub fn encode_error(&self, payload: &ErrorPayload) -> Vec<u8> {
        line(&payload.to_json())
    }
}

fn line(value: &Value) -> Vec<u8> {
    let mut line = value.to_string().into_bytes();
    line.push(b'\n');
    line
}
