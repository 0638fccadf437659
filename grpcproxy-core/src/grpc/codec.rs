//! # DynamicMessage Codec
//!
//! This module implements `tonic::codec::Codec` to enable `tonic` to transport
//! `prost_reflect::DynamicMessage` directly, bypassing the need for generated Rust structs.
//!
//! ## How it works
//!
//! 1. **Encoder**: request messages are already validated `DynamicMessage`s, so encoding is a
//!    plain Protobuf serialization into the gRPC byte buffer.
//! 2. **Decoder**: raw bytes from the wire are merged into an empty `DynamicMessage` built from
//!    the output `MessageDescriptor`.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use std::sync::Arc;
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A Codec that sends and receives `DynamicMessage`s.
///
/// It only needs the schema of the response message; requests carry their own descriptor.
pub struct DynamicCodec {
    res_desc: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(res_desc: MessageDescriptor) -> Self {
        Self { res_desc }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.res_desc.clone())
    }
}

/// Responsible for encoding a `DynamicMessage` into Protobuf bytes.
pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

/// Responsible for decoding Protobuf bytes into a `DynamicMessage`.
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.0.clone());
        msg.merge(src).map_err(|e| decode_failure(&self.0, e))?;

        Ok(Some(msg))
    }
}

/// A response that cannot be decoded is a local failure, so the status carries the decode error
/// as its source.
fn decode_failure(descriptor: &MessageDescriptor, err: prost::DecodeError) -> Status {
    let mut status = Status::internal(format!(
        "Failed to decode '{}' from Protobuf bytes: {}",
        descriptor.full_name(),
        err
    ));
    status.set_source(Arc::new(err));
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, grpc::CallStatus};
    use echo_service::FILE_DESCRIPTOR_SET;
    use prost_reflect::DescriptorPool;

    #[test]
    fn undecodable_responses_are_local_failures() {
        let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
        let descriptor = pool.get_message_by_name("echo.EchoResponse").unwrap();

        let err = DynamicMessage::decode(descriptor.clone(), &[0xff, 0xff, 0xff][..]).unwrap_err();
        let status = CallStatus::from_status(&decode_failure(&descriptor, err));

        assert_eq!(status.code(), tonic::Code::Internal);
        assert_eq!(status.kind(), Some(ErrorKind::TransportError));
    }
}
