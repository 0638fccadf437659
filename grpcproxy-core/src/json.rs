//! # JSON <-> Protobuf mapping
//!
//! The [`decoder`] turns caller JSON into `DynamicMessage`s for a method's input type; the
//! [`encoder`] turns invocation events back into JSON bytes. Both use the canonical Protobuf JSON
//! mapping implemented by `prost-reflect`, so 64-bit integers are accepted as JSON strings or
//! numbers and are written back as strings.
pub mod decoder;
pub mod encoder;
