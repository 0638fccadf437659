//! # Connection Manager
//!
//! Opens the transport connection a single invocation runs on. Connections are never pooled:
//! the returned [`Channel`] is released when the last clone of it is dropped, which happens
//! once the invocation reaches its terminal status (or fails earlier).
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Upper bound on establishing a connection when nothing else is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),
    #[error("Timed out after {timeout:?} connecting to '{address}'")]
    Timeout { address: String, timeout: Duration },
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// Connects to the gRPC server at `address`.
///
/// The address may be a bare `host:port` or a full `http://` / `https://` URI.
/// Establishment is abandoned with [`ConnectError::Timeout`] once `timeout` elapses.
pub async fn connect(address: &str, timeout: Duration) -> Result<Channel, ConnectError> {
    let uri = normalize_address(address);

    let endpoint = Endpoint::new(uri.clone())
        .map_err(|e| ConnectError::InvalidAddress(address.to_string(), e))?
        .connect_timeout(timeout);

    tracing::debug!(%uri, ?timeout, "connecting");

    match tokio::time::timeout(timeout, endpoint.connect()).await {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(e)) => Err(ConnectError::ConnectionFailed(address.to_string(), e)),
        Err(_) => Err(ConnectError::Timeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

/// Prefixes scheme-less addresses with `http://`, gRPC's plaintext default.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
