//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind addresses, TLS, request queue).
    pub listener: ListenerConfig,

    /// Application identity and asset tree.
    pub application: ApplicationConfig,

    /// CAS server and session cookie settings.
    pub cas: CasConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GateConfig {
    /// Session cookie name, scoped to this application instance.
    pub fn cookie_name(&self) -> String {
        self.cas
            .cookie_name
            .clone()
            .unwrap_or_else(|| format!("{}-cas-session", self.application.name))
    }

    /// Origin this service is reached at, e.g. `https://gate.example.edu`.
    pub fn own_origin(&self) -> String {
        format!("https://{}", self.application.public_host)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address. Requests here are only redirected to HTTPS
    /// unless a trusted proxy marks them as forwarded over TLS.
    pub bind_address: String,

    /// HTTPS bind address, used when `tls` is set.
    pub tls_bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Treat `X-Forwarded-Proto: https` as an encrypted transport.
    pub trust_forwarded_proto: bool,

    /// Requests waiting for the dispatcher before connections see backpressure.
    pub queue_depth: usize,

    /// Largest request body buffered for the dispatcher.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls_bind_address: "0.0.0.0:8443".to_string(),
            tls: None,
            trust_forwarded_proto: false,
            queue_depth: 64,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// The application served behind the gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name; the gate serves `/<name>/`.
    pub name: String,

    /// Host (and port) clients use, e.g. "gate.example.edu".
    pub public_host: String,

    /// Directory holding `<name>/<home_page>` and the shared asset folder.
    pub assets_root: String,

    /// Shared asset folder under `assets_root`.
    pub asset_folder: String,

    /// Home page file under `<assets_root>/<name>/`.
    pub home_page: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            public_host: "localhost:8443".to_string(),
            assets_root: "www".to_string(),
            asset_folder: "html".to_string(),
            home_page: "index.html".to_string(),
        }
    }
}

/// CAS server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CasConfig {
    /// Base URL of the CAS server (must be https).
    pub server_url: String,

    /// Login endpoint, relative to `server_url`.
    pub login_path: String,

    /// Ticket validation endpoint, relative to `server_url`.
    pub validate_path: String,

    /// Session cookie name. Defaults to "<application>-cas-session".
    pub cookie_name: Option<String>,

    /// Timeout for the validation call in seconds.
    pub timeout_secs: u64,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            server_url: "https://cas.example.edu/cas".to_string(),
            login_path: "logon".to_string(),
            validate_path: "serviceValidate".to_string(),
            cookie_name: None,
            timeout_secs: 10,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time a connection waits for its response, including queueing behind
    /// other requests, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Expose Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
