//! # Echo Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide gRPC server implementations,
//! `.proto` sources and a descriptor set for integration testing the `grpcproxy` gateway.
//! It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/echo.rs"));
}

pub mod common {
    pub mod v1 {
        include!(concat!(env!("OUT_DIR"), "/common.v1.rs"));
    }
}

pub mod greeter {
    pub mod v1 {
        include!(concat!(env!("OUT_DIR"), "/greeter.v1.rs"));
    }
}

mod server;

pub use greeter::v1::greeter_server::{Greeter, GreeterServer};
pub use pb::echo_service_server::{EchoService, EchoServiceServer};
pub use server::{EchoServiceImpl, GreeterImpl};

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");

/// Directory holding the `.proto` sources the descriptor set was compiled from.
pub const PROTO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/proto");
