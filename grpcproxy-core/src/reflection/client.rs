//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1`, falling back to `grpc.reflection.v1alpha`
//! for servers that only expose the older service.
//!
//! Both versions share the exact same wire messages, so a single set of message types is used and
//! only the HTTP/2 path changes between them.
//!
//! All queries are issued over one bidirectional stream, a [`ReflectionSession`]. The session
//! owns the stream; dropping it half-closes the request side and cancels the response side, so
//! the stream is released on every exit path.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use http::uri::PathAndQuery;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Streaming, client::GrpcService, transport::Channel};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionResolveError {
    #[error("The server does not implement the gRPC reflection protocol (v1 or v1alpha)")]
    Unsupported,

    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),

    #[error("Failed to start a stream request with the reflection server: '{0}'")]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("The server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Internal error: Failed to send request to stream")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

/// The reflection protocol revisions, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionVersion {
    V1,
    V1Alpha,
}

impl ReflectionVersion {
    pub fn service_name(&self) -> &'static str {
        match self {
            ReflectionVersion::V1 => "grpc.reflection.v1.ServerReflection",
            ReflectionVersion::V1Alpha => "grpc.reflection.v1alpha.ServerReflection",
        }
    }

    fn path(&self) -> PathAndQuery {
        match self {
            ReflectionVersion::V1 => PathAndQuery::from_static(
                "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
            ),
            ReflectionVersion::V1Alpha => PathAndQuery::from_static(
                "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
            ),
        }
    }
}

// The host defined in the reflection requests doesn't seem to be a mandatory field
// and there is no documentation about what it is about.
// So we won't enforce it from the user.
const EMPTY_HOST: &str = "";

const REQUEST_BUFFER: usize = 100;

/// A generic client for the gRPC Server Reflection Protocol.
pub struct ReflectionClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Opens a reflection stream with the first protocol version the server implements.
    ///
    /// A version is skipped only when the server answers `UNIMPLEMENTED`; any other failure
    /// is reported as is.
    pub async fn open_session(&mut self) -> Result<ReflectionSession, ReflectionResolveError> {
        for version in [ReflectionVersion::V1, ReflectionVersion::V1Alpha] {
            self.client
                .ready()
                .await
                .map_err(|e| ReflectionResolveError::ClientNotReady(e.into()))?;

            let (tx, rx) = mpsc::channel(REQUEST_BUFFER);

            let response = self
                .client
                .streaming(
                    tonic::Request::new(ReceiverStream::new(rx)),
                    version.path(),
                    tonic_prost::ProstCodec::<ServerReflectionRequest, ServerReflectionResponse>::default(),
                )
                .await;

            match response {
                Ok(response) => {
                    tracing::debug!(service = version.service_name(), "reflection session opened");
                    return Ok(ReflectionSession {
                        version,
                        requests: tx,
                        responses: response.into_inner(),
                    });
                }
                Err(status) if status.code() == Code::Unimplemented => {
                    tracing::debug!(
                        service = version.service_name(),
                        "reflection service not implemented by peer"
                    );
                }
                Err(status) => return Err(ReflectionResolveError::ServerStreamInitFailed(status)),
            }
        }

        Err(ReflectionResolveError::Unsupported)
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        self.open_session().await?.list_services().await
    }

    /// Builds the transitive `FileDescriptorSet` of the file defining `symbol`
    /// (e.g., `my.package.MyService`).
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        self.open_session()
            .await?
            .file_descriptor_set_by_symbols(&[symbol.to_string()])
            .await
    }
}

/// One open reflection stream.
pub struct ReflectionSession {
    version: ReflectionVersion,
    requests: mpsc::Sender<ServerReflectionRequest>,
    responses: Streaming<ServerReflectionResponse>,
}

impl ReflectionSession {
    pub fn version(&self) -> ReflectionVersion {
        self.version
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        self.send(MessageRequest::ListServices(String::new()))
            .await?;

        match self.next_response().await? {
            MessageResponse::ListServicesResponse(resp) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(ReflectionResolveError::UnexpectedResponseType(format!(
                "{other:?}"
            ))),
        }
    }

    /// Asks the reflection service for the files containing each of the requested symbols.
    ///
    /// **Recursive Resolution**:
    ///    - The server returns `FileDescriptorProto`s.
    ///    - The session inspects the imports (dependencies) of every file.
    ///    - It requests any missing dependency until the full `FileDescriptorSet` is built.
    pub async fn file_descriptor_set_by_symbols(
        &mut self,
        symbols: &[String],
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        for symbol in symbols {
            self.send(MessageRequest::FileContainingSymbol(symbol.clone()))
                .await?;
        }

        let file_map = self.collect_descriptors(symbols.len()).await?;

        tracing::debug!(
            symbols = symbols.len(),
            files = file_map.len(),
            "collected file descriptors"
        );

        Ok(FileDescriptorSet {
            file: file_map.into_values().collect(),
        })
    }

    async fn send(&self, message_request: MessageRequest) -> Result<(), ReflectionResolveError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(message_request),
        };

        self.requests
            .send(req)
            .await
            .map_err(|_| ReflectionResolveError::SendFailed)
    }

    async fn next_response(&mut self) -> Result<MessageResponse, ReflectionResolveError> {
        let response = self
            .responses
            .message()
            .await
            .map_err(ReflectionResolveError::ServerStreamFailure)?
            .ok_or(ReflectionResolveError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ErrorResponse(e)) => Err(ReflectionResolveError::ServerError {
                code: e.error_code,
                message: e.error_message,
            }),
            Some(other) => Ok(other),
            None => Err(ReflectionResolveError::UnexpectedResponseType(
                "Empty Message".into(),
            )),
        }
    }

    async fn collect_descriptors(
        &mut self,
        mut inflight: usize,
    ) -> Result<HashMap<String, FileDescriptorProto>, ReflectionResolveError> {
        let mut collected_files = HashMap::new();
        let mut requested = HashSet::new();

        while inflight > 0 {
            let response = self.next_response().await?;
            inflight -= 1;

            match response {
                MessageResponse::FileDescriptorResponse(res) => {
                    inflight += self
                        .process_descriptor_batch(
                            res.file_descriptor_proto,
                            &mut collected_files,
                            &mut requested,
                        )
                        .await?;
                }
                other => {
                    return Err(ReflectionResolveError::UnexpectedResponseType(format!(
                        "{other:?}"
                    )));
                }
            }
        }

        Ok(collected_files)
    }

    async fn process_descriptor_batch(
        &self,
        raw_protos: Vec<Vec<u8>>,
        collected_files: &mut HashMap<String, FileDescriptorProto>,
        requested: &mut HashSet<String>,
    ) -> Result<usize, ReflectionResolveError> {
        let mut sent_count = 0;

        for raw in raw_protos {
            let fd = FileDescriptorProto::decode(raw.as_ref())?;

            if let Some(name) = &fd.name
                && !collected_files.contains_key(name)
            {
                requested.insert(name.clone());
                sent_count += self
                    .queue_dependencies(&fd, collected_files, requested)
                    .await?;

                collected_files.insert(name.clone(), fd);
            }
        }

        Ok(sent_count)
    }

    async fn queue_dependencies(
        &self,
        fd: &FileDescriptorProto,
        collected_files: &HashMap<String, FileDescriptorProto>,
        requested: &mut HashSet<String>,
    ) -> Result<usize, ReflectionResolveError> {
        let mut count = 0;

        for dep in &fd.dependency {
            if !collected_files.contains_key(dep) && requested.insert(dep.clone()) {
                self.send(MessageRequest::FileByFilename(dep.clone()))
                    .await?;
                count += 1;
            }
        }

        Ok(count)
    }
}

impl Drop for ReflectionSession {
    fn drop(&mut self) {
        tracing::debug!(service = self.version.service_name(), "reflection session released");
    }
}
