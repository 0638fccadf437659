//! # Schema Resolver
//!
//! Produces a [`ServiceSchema`] in one of two mutually exclusive modes:
//!
//! * **File mode**: a local `.proto` file is compiled in-process with `protox`, resolving
//!   imports against the import paths. Any other file is read as an encoded
//!   `FileDescriptorSet` (the output of `protoc --descriptor_set_out --include_imports`).
//! * **Reflection mode**: a [`ReflectionSession`](crate::reflection::client::ReflectionSession)
//!   enumerates the server's services and fetches every file they transitively depend on.
//!   The session lives only for the duration of [`resolve_reflection`].
use super::{SchemaOrigin, ServiceSchema};
use crate::{
    BoxError,
    error::ErrorKind,
    reflection::client::{ReflectionClient, ReflectionResolveError},
};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorError, DescriptorPool};
use std::path::{Path, PathBuf};
use tonic::client::GrpcService;

/// Selects how a schema is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Reflection,
    File {
        path: PathBuf,
        import_paths: Vec<PathBuf>,
    },
}

impl SchemaSource {
    /// Builds a source from the optional `proto` and `import_path` request fields.
    ///
    /// Empty strings count as "not supplied".
    pub fn from_request(proto: Option<&str>, import_path: Option<&str>) -> Self {
        match proto.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => SchemaSource::File {
                path: PathBuf::from(path),
                import_paths: import_path
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .into_iter()
                    .collect(),
            },
            None => SchemaSource::Reflection,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Reflection resolution failed: '{0}'")]
    Reflection(#[from] ReflectionResolveError),
    #[error("Failed to read schema file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse schema file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: protox::Error,
    },
    #[error("Failed to build descriptor pool: '{0}'")]
    InvalidDescriptor(#[from] DescriptorError),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Reflection(ReflectionResolveError::Unsupported) => {
                ErrorKind::ReflectionUnsupported
            }
            ResolveError::Reflection(_) => ErrorKind::ReflectionIo,
            ResolveError::ReadFile { .. }
            | ResolveError::Parse { .. }
            | ResolveError::InvalidDescriptor(_) => ErrorKind::SchemaParseError,
        }
    }
}

/// Resolves a schema for `source`, using `connection` when reflection is selected.
pub async fn resolve<S>(connection: S, source: &SchemaSource) -> Result<ServiceSchema, ResolveError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    match source {
        SchemaSource::Reflection => resolve_reflection(connection).await,
        SchemaSource::File { path, import_paths } => resolve_file(path, import_paths),
    }
}

/// Asks the server behind `connection` to describe every service it exposes.
pub async fn resolve_reflection<S>(connection: S) -> Result<ServiceSchema, ResolveError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let mut client = ReflectionClient::new(connection);
    let mut session = client.open_session().await?;

    let services = session.list_services().await?;
    let fd_set = session.file_descriptor_set_by_symbols(&services).await?;
    let version = session.version();
    drop(session);

    let pool = DescriptorPool::from_file_descriptor_set(fd_set)?;

    tracing::debug!(services = services.len(), "schema resolved through reflection");

    Ok(ServiceSchema::new(pool, SchemaOrigin::Reflection(version)))
}

/// Parses a local schema file.
///
/// `.proto` files are compiled with their imports resolved against `import_paths`, or against
/// the file's own directory when no import path is given.
pub fn resolve_file(path: &Path, import_paths: &[PathBuf]) -> Result<ServiceSchema, ResolveError> {
    let pool = if path.extension().is_some_and(|ext| ext == "proto") {
        let includes = if import_paths.is_empty() {
            vec![parent_dir(path)]
        } else {
            import_paths.to_vec()
        };

        let fd_set = protox::compile([path], &includes).map_err(|source| ResolveError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        DescriptorPool::from_file_descriptor_set(fd_set)?
    } else {
        let bytes = std::fs::read(path).map_err(|source| ResolveError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        DescriptorPool::decode(bytes.as_slice())?
    };

    tracing::debug!(path = %path.display(), "schema resolved from file");

    Ok(ServiceSchema::new(pool, SchemaOrigin::File(path.to_path_buf())))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proto_selects_reflection() {
        assert_eq!(SchemaSource::from_request(None, None), SchemaSource::Reflection);
        assert_eq!(
            SchemaSource::from_request(Some(""), Some("/protos")),
            SchemaSource::Reflection
        );
    }

    #[test]
    fn proto_selects_file_mode() {
        assert_eq!(
            SchemaSource::from_request(Some("greeter.proto"), Some("/protos")),
            SchemaSource::File {
                path: PathBuf::from("greeter.proto"),
                import_paths: vec![PathBuf::from("/protos")],
            }
        );
        assert_eq!(
            SchemaSource::from_request(Some("a/b.proto"), Some(" ")),
            SchemaSource::File {
                path: PathBuf::from("a/b.proto"),
                import_paths: vec![],
            }
        );
    }

    #[test]
    fn parent_dir_defaults_to_cwd() {
        assert_eq!(parent_dir(Path::new("greeter.proto")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("a/b.proto")), PathBuf::from("a"));
    }
}
