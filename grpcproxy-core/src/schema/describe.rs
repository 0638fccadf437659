//! # Schema projections
//!
//! Serializable views of a [`ServiceSchema`] used by the `/list` and `/describe` endpoints.
//! Each description carries a `definition` rendered in `.proto` syntax next to its structured
//! fields.
use super::{Descriptor, MethodShape, ServiceSchema};
use prost_reflect::{
    EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    /// Method paths in `pkg.Service/Method` form.
    pub methods: Vec<String>,
}

/// Projects service and method names.
pub fn list_services(schema: &ServiceSchema) -> Vec<ServiceSummary> {
    schema
        .services()
        .map(|service| ServiceSummary {
            name: service.full_name().to_string(),
            methods: service
                .methods()
                .map(|m| format!("{}/{}", service.full_name(), m.name()))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolDescription {
    Service(ServiceDescription),
    Method(MethodDescription),
    Message(MessageDescription),
    Enum(EnumDescription),
}

impl From<&Descriptor> for SymbolDescription {
    fn from(descriptor: &Descriptor) -> Self {
        match descriptor {
            Descriptor::ServiceDescriptor(s) => SymbolDescription::Service(s.into()),
            Descriptor::MethodDescriptor(m) => SymbolDescription::Method(m.into()),
            Descriptor::MessageDescriptor(m) => SymbolDescription::Message(m.into()),
            Descriptor::EnumDescriptor(e) => SymbolDescription::Enum(e.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescription {
    pub name: String,
    pub full_name: String,
    pub methods: Vec<MethodDescription>,
    pub definition: String,
}

impl From<&ServiceDescriptor> for ServiceDescription {
    fn from(service: &ServiceDescriptor) -> Self {
        Self {
            name: service.name().to_string(),
            full_name: service.full_name().to_string(),
            methods: service.methods().map(|m| (&m).into()).collect(),
            definition: render_service(service),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodDescription {
    pub name: String,
    pub full_name: String,
    pub service: String,
    pub shape: MethodShape,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub input: MessageDescription,
    pub output: MessageDescription,
    pub definition: String,
}

impl From<&MethodDescriptor> for MethodDescription {
    fn from(method: &MethodDescriptor) -> Self {
        Self {
            name: method.name().to_string(),
            full_name: method.full_name().to_string(),
            service: method.parent_service().full_name().to_string(),
            shape: MethodShape::of(method),
            client_streaming: method.is_client_streaming(),
            server_streaming: method.is_server_streaming(),
            input: (&method.input()).into(),
            output: (&method.output()).into(),
            definition: render_method(method),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDescription {
    pub name: String,
    pub full_name: String,
    pub fields: Vec<FieldDescription>,
    pub definition: String,
}

impl From<&MessageDescriptor> for MessageDescription {
    fn from(message: &MessageDescriptor) -> Self {
        Self {
            name: message.name().to_string(),
            full_name: message.full_name().to_string(),
            fields: message.fields().map(|f| (&f).into()).collect(),
            definition: render_message(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDescription {
    pub name: String,
    pub json_name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl From<&FieldDescriptor> for FieldDescription {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            name: field.name().to_string(),
            json_name: field.json_name().to_string(),
            number: field.number(),
            field_type: FieldType::of(field),
        }
    }
}

/// The shape of a field's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Scalar { name: String },
    Message { name: String },
    Enum { name: String },
    Repeated { element: Box<FieldType> },
    Map { key: Box<FieldType>, value: Box<FieldType> },
}

impl FieldType {
    pub fn of(field: &FieldDescriptor) -> Self {
        if field.is_map()
            && let Kind::Message(entry) = field.kind()
        {
            return FieldType::Map {
                key: Box::new(FieldType::of_kind(entry.map_entry_key_field().kind())),
                value: Box::new(FieldType::of_kind(entry.map_entry_value_field().kind())),
            };
        }

        let element = FieldType::of_kind(field.kind());
        if field.is_list() {
            FieldType::Repeated {
                element: Box::new(element),
            }
        } else {
            element
        }
    }

    fn of_kind(kind: Kind) -> Self {
        match kind {
            Kind::Message(m) => FieldType::Message {
                name: m.full_name().to_string(),
            },
            Kind::Enum(e) => FieldType::Enum {
                name: e.full_name().to_string(),
            },
            scalar => FieldType::Scalar {
                name: scalar_name(&scalar).to_string(),
            },
        }
    }

    /// The type as written in a `.proto` file.
    pub fn proto_syntax(&self) -> String {
        match self {
            FieldType::Scalar { name } | FieldType::Message { name } | FieldType::Enum { name } => {
                name.clone()
            }
            FieldType::Repeated { element } => format!("repeated {}", element.proto_syntax()),
            FieldType::Map { key, value } => {
                format!("map<{}, {}>", key.proto_syntax(), value.proto_syntax())
            }
        }
    }
}

fn scalar_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(_) | Kind::Enum(_) => "",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumDescription {
    pub name: String,
    pub full_name: String,
    pub values: Vec<EnumValueDescription>,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumValueDescription {
    pub name: String,
    pub number: i32,
}

impl From<&EnumDescriptor> for EnumDescription {
    fn from(enum_desc: &EnumDescriptor) -> Self {
        Self {
            name: enum_desc.name().to_string(),
            full_name: enum_desc.full_name().to_string(),
            values: enum_desc
                .values()
                .map(|v| EnumValueDescription {
                    name: v.name().to_string(),
                    number: v.number(),
                })
                .collect(),
            definition: render_enum(enum_desc),
        }
    }
}

fn render_service(service: &ServiceDescriptor) -> String {
    let mut out = format!("service {} {{\n", service.name());
    for method in service.methods() {
        out.push_str("  ");
        out.push_str(&render_method(&method));
        out.push('\n');
    }
    out.push('}');
    out
}

fn render_method(method: &MethodDescriptor) -> String {
    let stream = |streaming: bool| if streaming { "stream " } else { "" };

    format!(
        "rpc {}({}{}) returns ({}{});",
        method.name(),
        stream(method.is_client_streaming()),
        method.input().full_name(),
        stream(method.is_server_streaming()),
        method.output().full_name()
    )
}

fn render_message(message: &MessageDescriptor) -> String {
    let mut out = format!("message {} {{\n", message.name());
    for field in message.fields() {
        out.push_str(&format!(
            "  {} {} = {};\n",
            FieldType::of(&field).proto_syntax(),
            field.name(),
            field.number()
        ));
    }
    out.push('}');
    out
}

fn render_enum(enum_desc: &EnumDescriptor) -> String {
    let mut out = format!("enum {} {{\n", enum_desc.name());
    for val in enum_desc.values() {
        out.push_str(&format!("  {} = {};\n", val.name(), val.number()));
    }
    out.push('}');
    out
}
