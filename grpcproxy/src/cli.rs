//! # CLI
//!
//! Command-line configuration of the `grpcproxy` HTTP listener, parsed with `clap`.
use clap::Parser;
use grpcproxy_core::gateway::GatewayConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "grpcproxy",
    version,
    about = "Expose any gRPC service over HTTP+JSON"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP listener to
    #[arg(short, long, default_value_t = 9000)]
    pub port: u16,

    /// Seconds to wait for a connection to a target server
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout: u64,

    /// Default deadline in seconds for calls that don't set `timeout_ms`
    #[arg(long)]
    pub call_timeout: Option<u64>,
}

impl Cli {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            call_timeout: self.call_timeout.map(Duration::from_secs),
        }
    }
}
