use crate::reflection::client::ReflectionVersion;
use prost_reflect::{
    DescriptorPool, EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use serde::Serialize;
use std::path::PathBuf;

/// Where a [`ServiceSchema`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOrigin {
    Reflection(ReflectionVersion),
    File(PathBuf),
}

/// An immutable description of zero or more services and the messages they use.
#[derive(Debug, Clone)]
pub struct ServiceSchema {
    pool: DescriptorPool,
    origin: SchemaOrigin,
}

impl ServiceSchema {
    pub fn new(pool: DescriptorPool, origin: SchemaOrigin) -> Self {
        Self { pool, origin }
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn origin(&self) -> &SchemaOrigin {
        &self.origin
    }

    /// All services in the schema, in pool order.
    pub fn services(&self) -> impl Iterator<Item = ServiceDescriptor> + '_ {
        self.pool.services()
    }

    /// Looks up a method by its fully qualified name.
    ///
    /// Accepted spellings are `pkg.Service/Method`, `/pkg.Service/Method` and
    /// `pkg.Service.Method`. Service and method names must match exactly.
    pub fn find_method(&self, name: &str) -> Option<MethodDescriptor> {
        let (service, method) = split_method_name(name)?;

        self.pool
            .get_service_by_name(service)?
            .methods()
            .find(|m| m.name() == method)
    }

    /// Looks up a service, message, enum or method by its fully qualified name.
    pub fn find_symbol(&self, symbol: &str) -> Option<Descriptor> {
        let symbol = symbol.trim_start_matches('/');

        if let Some(descriptor) = self.pool.get_service_by_name(symbol) {
            return Some(Descriptor::ServiceDescriptor(descriptor));
        }
        if let Some(descriptor) = self.pool.get_message_by_name(symbol) {
            return Some(Descriptor::MessageDescriptor(descriptor));
        }
        if let Some(descriptor) = self.pool.get_enum_by_name(symbol) {
            return Some(Descriptor::EnumDescriptor(descriptor));
        }
        self.find_method(symbol).map(Descriptor::MethodDescriptor)
    }
}

fn split_method_name(name: &str) -> Option<(&str, &str)> {
    let name = name.trim_start_matches('/');

    let (service, method) = match name.split_once('/') {
        Some(parts) => parts,
        None => name.rsplit_once('.')?,
    };

    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }

    Some((service, method))
}

/// The four RPC call shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodShape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidirectional,
}

impl MethodShape {
    pub fn of(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => MethodShape::Unary,
            (false, true) => MethodShape::ServerStreaming,
            (true, false) => MethodShape::ClientStreaming,
            (true, true) => MethodShape::Bidirectional,
        }
    }

    pub fn is_client_streaming(&self) -> bool {
        matches!(self, MethodShape::ClientStreaming | MethodShape::Bidirectional)
    }

    pub fn is_server_streaming(&self) -> bool {
        matches!(self, MethodShape::ServerStreaming | MethodShape::Bidirectional)
    }
}

/// A generic wrapper for different types of Protobuf descriptors.
///
/// This enum allows the schema to return a single type when resolving symbols,
/// regardless of whether the symbol points to a Service, a Method, a Message, or an Enum.
#[derive(Debug, Clone)]
pub enum Descriptor {
    MessageDescriptor(MessageDescriptor),
    ServiceDescriptor(ServiceDescriptor),
    MethodDescriptor(MethodDescriptor),
    EnumDescriptor(EnumDescriptor),
}

impl Descriptor {
    /// Returns the name (e.g.,`MyMessage`) of the inner descriptor
    pub fn name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.name(),
            Descriptor::ServiceDescriptor(v) => v.name(),
            Descriptor::MethodDescriptor(v) => v.name(),
            Descriptor::EnumDescriptor(v) => v.name(),
        }
    }

    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.full_name(),
            Descriptor::ServiceDescriptor(v) => v.full_name(),
            Descriptor::MethodDescriptor(v) => v.full_name(),
            Descriptor::EnumDescriptor(v) => v.full_name(),
        }
    }
}
