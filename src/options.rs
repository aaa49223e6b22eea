//! Connection options for a [`Client`](crate::Client)

use std::env;
use std::time::Duration;

use crate::transport::DEFAULT_SERVICE;

/// Environment variable naming the daemon host (`host` or `host:port`)
pub const SERVER_ENV: &str = "LASH_SERVER";

/// Environment variable naming the daemon service or port
pub const SERVICE_ENV: &str = "LASH_SERVICE";

const DEFAULT_HOST: &str = "localhost";

/// How to reach the session daemon
///
/// The server is picked from, in order: the `--lash-server=` option, this
/// struct, the `LASH_SERVER` environment variable, then `localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// `host` or `host:port`
    pub server: Option<String>,
    /// Service name or port number, used when the server carries no port
    pub service: String,
    /// Bound on each connect attempt
    pub connect_timeout: Option<Duration>,
    /// Bound on each blocking send
    pub write_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: None,
            service: DEFAULT_SERVICE.to_string(),
            connect_timeout: None,
            write_timeout: None,
        }
    }
}

impl ClientOptions {
    /// Create a builder for custom options
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Options taken from `LASH_SERVER` and `LASH_SERVICE`
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(server) = env_var(SERVER_ENV) {
            options.server = Some(server);
        }
        if let Some(service) = env_var(SERVICE_ENV) {
            options.service = service;
        }
        options
    }

    /// Resolve the `(host, service)` pair to connect to
    ///
    /// `cli_server` is the value of a `--lash-server=` option, if any.
    pub fn target(&self, cli_server: Option<&str>) -> (String, String) {
        let server = cli_server
            .map(ToOwned::to_owned)
            .or_else(|| self.server.clone())
            .or_else(|| env_var(SERVER_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let (host, port) = split_host_port(&server);
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let service = port.unwrap_or(&self.service);

        (host.to_string(), service.to_string())
    }
}

/// Builder for ClientOptions
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Daemon host, optionally with `:port`
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.options.server = Some(server.into());
        self
    }

    /// Service name or port number
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.options.service = service.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.options.write_timeout = Some(timeout);
        self
    }

    /// Build the options
    pub fn build(self) -> ClientOptions {
        self.options
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Split `host:port`, `[v6]:port`, `host` or a bare IPv6 address
fn split_host_port(server: &str) -> (&str, Option<&str>) {
    if let Some(rest) = server.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').filter(|p| !p.is_empty());
            return (host, port);
        }
    }

    match server.rsplit_once(':') {
        // more than one colon: an unbracketed IPv6 address
        Some((host, _)) if host.contains(':') => (server, None),
        Some((host, port)) if !port.is_empty() => (host, Some(port)),
        Some((host, _)) => (host, None),
        None => (server, None),
    }
}
