//! # grpcproxy core
//!
//! `grpcproxy-core` is the engine behind the `grpcproxy` HTTP+JSON gateway. It invokes any gRPC
//! method on any server without compile-time knowledge of the Protobuf schema: the schema is
//! resolved at request time and treated as plain runtime data.
//!
//! ## Pipeline
//!
//! A single call flows through five stages, each living in its own module:
//!
//! 1. **[`connection`]:** Opens a bounded-lifetime [`tonic::transport::Channel`] to the target.
//! 2. **[`schema`]:** Produces a [`schema::ServiceSchema`] either from the server's reflection
//!    service or from a local `.proto` / descriptor set file.
//! 3. **[`json::decoder`]:** Turns the caller's JSON into a (lazy) sequence of
//!    [`prost_reflect::DynamicMessage`]s for the method's input type.
//! 4. **[`grpc::invoker`]:** Drives the RPC exchange for every call shape through one code path and
//!    emits an ordered sequence of [`grpc::InvocationEvent`]s that always ends with one status.
//! 5. **[`json::encoder`]:** Turns each event back into JSON bytes for the caller.
//!
//! [`gateway::Gateway`] wires the stages together in that order.
//!
//! ## Errors
//!
//! Every failure is classified with an [`error::ErrorKind`] so that callers can tell "bad input"
//! from "peer unreachable" from "peer rejected the call".
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod connection;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod json;
pub mod reflection;
pub mod schema;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
