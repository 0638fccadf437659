//! # Request Decoder
//!
//! Resolves the target method in a [`ServiceSchema`] and converts the caller's JSON body into
//! the request messages for it.
//!
//! * Unary-input methods take exactly one message. A missing (`null`) body means an empty
//!   message; a JSON array is rejected.
//! * Streaming-input methods take a JSON array (one element per stream item) or a single value
//!   (a one-item stream). The first item is decoded up front so that a body that cannot produce
//!   a single valid message fails before any traffic is sent. The remaining items are decoded
//!   lazily as the invoker pulls them: a failure on item *k* ends the sequence without
//!   discarding items 1..k-1.
use crate::{error::ErrorKind, schema::ServiceSchema};
use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, MethodDescriptor};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Method '{0}' not found")]
    MethodNotFound(String),
    #[error("Method '{0}' takes a single request message, but the body is a JSON array")]
    UnexpectedArray(String),
    #[error("Request message #{index} does not match '{message}': {source}")]
    Item {
        index: usize,
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::MethodNotFound(_) => ErrorKind::MethodNotFound,
            DecodeError::UnexpectedArray(_) | DecodeError::Item { .. } => ErrorKind::DecodeError,
        }
    }
}

/// Converts JSON bodies into request messages.
///
/// Unknown JSON fields are rejected by default.
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    options: DeserializeOptions,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::strict()
    }
}

impl RequestDecoder {
    /// A decoder that rejects unknown fields.
    pub fn strict() -> Self {
        Self {
            options: DeserializeOptions::new().deny_unknown_fields(true),
        }
    }

    /// A decoder that silently drops unknown fields.
    pub fn lenient() -> Self {
        Self {
            options: DeserializeOptions::new().deny_unknown_fields(false),
        }
    }

    /// Looks up `method_name` in `schema` and prepares the request messages from `body`.
    pub fn decode(
        &self,
        schema: &ServiceSchema,
        method_name: &str,
        body: Value,
    ) -> Result<DecodedRequest, DecodeError> {
        let method = schema
            .find_method(method_name)
            .ok_or_else(|| DecodeError::MethodNotFound(method_name.to_string()))?;

        let items = if method.is_client_streaming() {
            match body {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                single => vec![single],
            }
        } else {
            match body {
                Value::Array(_) => {
                    return Err(DecodeError::UnexpectedArray(method.full_name().to_string()));
                }
                Value::Null => vec![Value::Object(Default::default())],
                single => vec![single],
            }
        };

        let mut messages = RequestMessages {
            descriptor: method.input(),
            options: self.options.clone(),
            primed: None,
            pending: items.into_iter(),
            next_index: 1,
            exhausted: false,
        };
        messages.prime()?;

        Ok(DecodedRequest { method, messages })
    }
}

/// The resolved method and the messages to send to it.
#[derive(Debug)]
pub struct DecodedRequest {
    pub method: MethodDescriptor,
    pub messages: RequestMessages,
}

/// A lazy sequence of request messages.
///
/// The sequence ends after the first item that fails to decode.
#[derive(Debug)]
pub struct RequestMessages {
    descriptor: MessageDescriptor,
    options: DeserializeOptions,
    primed: Option<DynamicMessage>,
    pending: std::vec::IntoIter<Value>,
    next_index: usize,
    exhausted: bool,
}

impl RequestMessages {
    /// Number of items not yet handed out.
    pub fn remaining(&self) -> usize {
        if self.exhausted {
            0
        } else {
            usize::from(self.primed.is_some()) + self.pending.len()
        }
    }

    fn prime(&mut self) -> Result<(), DecodeError> {
        self.primed = match self.decode_next() {
            Some(result) => Some(result?),
            None => None,
        };
        Ok(())
    }

    fn decode_next(&mut self) -> Option<Result<DynamicMessage, DecodeError>> {
        let value = self.pending.next()?;
        let index = self.next_index;
        self.next_index += 1;

        let result = DynamicMessage::deserialize_with_options(
            self.descriptor.clone(),
            value,
            &self.options,
        )
        .map_err(|source| DecodeError::Item {
            index,
            message: self.descriptor.full_name().to_string(),
            source,
        });

        Some(result)
    }
}

impl Iterator for RequestMessages {
    type Item = Result<DynamicMessage, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        if let Some(message) = self.primed.take() {
            return Some(Ok(message));
        }

        let item = self.decode_next();
        if !matches!(item, Some(Ok(_))) {
            self.exhausted = true;
        }
        item
    }
}
