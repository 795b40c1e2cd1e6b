//! Server module for running Terraform providers
//!
//! This module starts the gRPC server, performs the go-plugin handshake on
//! stdout and, in debug mode, prints reattach information instead.

use crate::error::{Result, TfplugError};
use crate::grpc::GrpcProviderServer;
use crate::proto::provider_server::ProviderServer;
use crate::provider::Provider;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};

/// Environment cookie Terraform sets when it launches a provider
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Registry address used in reattach output, e.g. registry.terraform.io/acme/cloudsec
    pub provider_address: String,
    /// Path to TLS certificate file; plaintext when unset
    pub cert_path: Option<PathBuf>,
    /// Path to TLS key file
    pub key_path: Option<PathBuf>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Serve for a debugger: no cookie check, print TF_REATTACH_PROVIDERS
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            provider_address: String::new(),
            cert_path: None,
            key_path: None,
            max_message_size: 256 << 20, // 256MB
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration with default values
    pub fn new(provider_address: &str) -> Self {
        Self {
            provider_address: provider_address.to_string(),
            ..Self::default()
        }
    }

    /// Serve with TLS using the given certificate and key files
    pub fn with_tls(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.cert_path = Some(cert_path);
        self.key_path = Some(key_path);
        self
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Handshake line go-plugin reads from stdout
pub fn handshake_line(addr: &SocketAddr) -> String {
    format!("1|6|tcp|{}|grpc", addr)
}

/// Value for TF_REATTACH_PROVIDERS pointing Terraform at a running provider
pub fn reattach_config(provider_address: &str, addr: &SocketAddr) -> String {
    let mut providers = serde_json::Map::new();
    providers.insert(
        provider_address.to_string(),
        json!({
            "Protocol": "grpc",
            "ProtocolVersion": 6,
            "Pid": std::process::id(),
            "Test": true,
            "Addr": {
                "Network": "tcp",
                "String": addr.to_string(),
            }
        }),
    );
    serde_json::Value::Object(providers).to_string()
}

async fn load_tls(config: &ServerConfig) -> Result<Option<ServerTlsConfig>> {
    let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
        return Ok(None);
    };

    // A second install attempt reports the provider that is already in place
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cert = tokio::fs::read(cert_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read certificate: {}", e)))?;

    let key = tokio::fs::read(key_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;

    Ok(Some(
        ServerTlsConfig::new().identity(Identity::from_pem(cert, key)),
    ))
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if !config.debug && std::env::var(MAGIC_COOKIE_KEY).as_deref() != Ok(MAGIC_COOKIE_VALUE) {
        return Err(TfplugError::InvalidConfiguration(
            "This binary is a plugin. It is not meant to be executed directly; \
             run Terraform instead, or start it with -debug"
                .to_string(),
        ));
    }

    let grpc_server = GrpcProviderServer::new(provider);
    let root = grpc_server.context();
    let provider_service = ProviderServer::new(grpc_server)
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let tls = if config.debug {
        None
    } else {
        load_tls(&config).await?
    };

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }
    let router = builder.add_service(provider_service);

    if config.debug {
        println!("Provider started. To attach Terraform, set TF_REATTACH_PROVIDERS:\n");
        println!(
            "\tTF_REATTACH_PROVIDERS='{}'",
            reattach_config(&config.provider_address, &addr)
        );
    } else {
        println!("{}", handshake_line(&addr));
    }
    tracing::info!(%addr, debug = config.debug, "provider server listening");

    let incoming = TcpListenerStream::new(listener);
    router
        .serve_with_incoming_shutdown(incoming, async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = root.cancelled() => {}
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_advertises_protocol_six_over_grpc() {
        let addr: SocketAddr = "127.0.0.1:43210".parse().unwrap();
        assert_eq!(handshake_line(&addr), "1|6|tcp|127.0.0.1:43210|grpc");
    }

    #[test]
    fn reattach_config_names_provider_and_address() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reattach_config(
            "registry.terraform.io/acme/cloudsec",
            &addr,
        ))
        .unwrap();

        let entry = &value["registry.terraform.io/acme/cloudsec"];
        assert_eq!(entry["ProtocolVersion"], 6);
        assert_eq!(entry["Addr"]["String"], "127.0.0.1:5000");
    }

    #[test]
    fn tls_is_optional() {
        let config = ServerConfig::new("registry.terraform.io/acme/cloudsec");
        assert!(config.cert_path.is_none());

        let config = config.with_tls("cert.pem".into(), "key.pem".into());
        assert!(config.key_path.is_some());
    }
}
