//! # Gateway
//!
//! Runs the request pipeline: connect, resolve the schema, decode the request, invoke.
//!
//! Each stage that fails before any traffic is sent returns a [`GatewayError`]. Once the call is
//! started, every outcome (including failures) is reported through the returned
//! [`Invocation`]'s event stream.
//!
//! The `*_on` variants take an already established transport instead of an address. They are
//! what the address-based entry points delegate to, and allow driving any
//! [`GrpcService`](tonic::client::GrpcService), such as an in-process server.
use crate::{
    BoxError,
    connection::{self, DEFAULT_CONNECT_TIMEOUT},
    error::GatewayError,
    grpc::{DynamicInvoker, InvokeOptions, Invocation},
    json::decoder::RequestDecoder,
    schema::{
        self, SchemaSource, ServiceSchema,
        describe::{ServiceSummary, SymbolDescription},
    },
};
use http_body::Body as HttpBody;
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tonic::client::GrpcService;

/// A request to invoke one method.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetRequest {
    /// `host:port` of the target server.
    pub address: String,
    /// Fully qualified method name, e.g. `helloworld.Greeter/SayHello`.
    pub method: String,
    /// Local schema file. Reflection is used when absent or empty.
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub import_path: Option<String>,
    /// The request message, or an array of messages for streaming-input methods.
    #[serde(default)]
    pub data: serde_json::Value,
    /// gRPC metadata attached to the call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-call deadline in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TargetRequest {
    pub fn schema_source(&self) -> SchemaSource {
        SchemaSource::from_request(self.proto.as_deref(), self.import_path.as_deref())
    }
}

/// Selects the schema to list or describe.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaQuery {
    /// Required for reflection, optional when `proto` is given.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub import_path: Option<String>,
}

impl SchemaQuery {
    pub fn schema_source(&self) -> SchemaSource {
        SchemaSource::from_request(self.proto.as_deref(), self.import_path.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub connect_timeout: Duration,
    /// Deadline applied to calls that don't set their own.
    pub call_timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
        }
    }
}

/// Stateless request pipeline. Nothing is shared between calls.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    config: GatewayConfig,
    decoder: RequestDecoder,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            decoder: RequestDecoder::strict(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Connects to `request.address` and starts the call.
    pub async fn call(&self, request: TargetRequest) -> Result<Invocation, GatewayError> {
        let channel = connection::connect(&request.address, self.config.connect_timeout).await?;
        self.call_on(channel, request).await
    }

    /// Starts the call on an established transport.
    pub async fn call_on<S>(
        &self,
        connection: S,
        request: TargetRequest,
    ) -> Result<Invocation, GatewayError>
    where
        S: GrpcService<tonic::body::Body> + Clone + Send + 'static,
        S::Future: Send,
        S::Error: Into<BoxError> + Send,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let schema = schema::resolve(connection.clone(), &request.schema_source()).await?;

        let TargetRequest {
            method,
            data,
            headers,
            timeout_ms,
            ..
        } = request;

        let decoded = self.decoder.decode(&schema, &method, data)?;

        let options = InvokeOptions {
            headers: headers.into_iter().collect(),
            timeout: timeout_ms
                .map(Duration::from_millis)
                .or(self.config.call_timeout),
        };

        tracing::debug!(
            method = decoded.method.full_name(),
            items = decoded.messages.remaining(),
            "invoking"
        );

        let invocation =
            DynamicInvoker::new(connection).invoke(decoded.method, decoded.messages, options)?;

        Ok(invocation)
    }

    /// Lists the services of the selected schema.
    pub async fn list(&self, query: &SchemaQuery) -> Result<Vec<ServiceSummary>, GatewayError> {
        let schema = self.schema(query).await?;
        Ok(schema::describe::list_services(&schema))
    }

    pub async fn list_on<S>(
        &self,
        connection: S,
        query: &SchemaQuery,
    ) -> Result<Vec<ServiceSummary>, GatewayError>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let schema = schema::resolve(connection, &query.schema_source()).await?;
        Ok(schema::describe::list_services(&schema))
    }

    /// Describes a service, method, message or enum of the selected schema.
    pub async fn describe(
        &self,
        query: &SchemaQuery,
        symbol: &str,
    ) -> Result<SymbolDescription, GatewayError> {
        let schema = self.schema(query).await?;
        describe_symbol(&schema, symbol)
    }

    pub async fn describe_on<S>(
        &self,
        connection: S,
        query: &SchemaQuery,
        symbol: &str,
    ) -> Result<SymbolDescription, GatewayError>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let schema = schema::resolve(connection, &query.schema_source()).await?;
        describe_symbol(&schema, symbol)
    }

    /// Resolves the schema for a listing query. File mode never touches the network.
    async fn schema(&self, query: &SchemaQuery) -> Result<ServiceSchema, GatewayError> {
        match query.schema_source() {
            SchemaSource::File { path, import_paths } => {
                Ok(schema::resolve_file(&path, &import_paths)?)
            }
            SchemaSource::Reflection => {
                let address = query
                    .address
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        GatewayError::InvalidRequest(
                            "either `address` or `proto` must be provided".to_string(),
                        )
                    })?;

                let channel = connection::connect(address, self.config.connect_timeout).await?;
                Ok(schema::resolve_reflection(channel).await?)
            }
        }
    }
}

fn describe_symbol(schema: &ServiceSchema, symbol: &str) -> Result<SymbolDescription, GatewayError> {
    schema
        .find_symbol(symbol)
        .map(|descriptor| SymbolDescription::from(&descriptor))
        .ok_or_else(|| GatewayError::SymbolNotFound(symbol.to_string()))
}
