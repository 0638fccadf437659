//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It enables the gateway to query a server for its own Protobuf schema at runtime, so that
//! methods can be invoked without pre-compiled descriptors.
pub mod client;
