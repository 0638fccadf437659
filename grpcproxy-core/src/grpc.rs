//! # Generic gRPC Transport
//!
//! This module contains the low-level building blocks for performing gRPC calls using
//! dynamic message types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g., `HelloRequest`),
//! the components here work with `prost_reflect::DynamicMessage`s whose layout is only known
//! at runtime, and report the progress of a call as a sequence of [`InvocationEvent`]s.
pub mod codec;
mod event;
pub mod invoker;

pub use event::{CallStatus, InvocationEvent};
pub use invoker::{CancelHandle, DynamicInvoker, InvokeOptions, Invocation};
