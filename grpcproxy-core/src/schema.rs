//! # Schema Resolution
//!
//! A [`ServiceSchema`] is an immutable, queryable view over a `prost_reflect::DescriptorPool`:
//! services, their methods and the message graph reachable from them, navigated by name.
//!
//! Schemas are produced per request by the [`resolver`], either from a live server through the
//! reflection protocol or from a local schema file, and are never cached or shared.
pub mod describe;
pub mod resolver;
mod types;

pub use resolver::{ResolveError, SchemaSource, resolve, resolve_file, resolve_reflection};
pub use types::*;
