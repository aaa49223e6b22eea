use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use lash::{ClientFlags, ClientOptions};

use crate::cli::ConnectArgs;

const DEFAULT_CLASS: &str = "LASH Simple Client";

/// TOML config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Daemon settings
    pub server: ServerSection,

    /// Client identity settings
    pub client: ClientSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// `host` or `host:port`
    pub host: Option<String>,
    pub service: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub class: Option<String>,
    pub flags: Option<Vec<String>>,
}

/// Merged configuration from file + CLI
#[derive(Debug)]
pub struct MergedConfig {
    pub options: ClientOptions,
    pub class: String,
    pub flags: ClientFlags,
}

/// Load config from file
pub fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let config: FileConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(FileConfig::default()),
    }
}

/// Merge file config with CLI args (CLI takes precedence)
pub fn merge_config(file: FileConfig, cli: &ConnectArgs) -> Result<MergedConfig> {
    let mut builder = ClientOptions::builder();

    // Server: CLI > file; unset falls through to LASH_SERVER and localhost
    if let Some(server) = cli.server.clone().or(file.server.host) {
        builder = builder.server(server);
    }

    if let Some(service) = cli.service.clone().or(file.server.service) {
        builder = builder.service(service);
    }

    if let Some(ms) = cli.connect_timeout_ms.or(file.server.connect_timeout_ms) {
        builder = builder.connect_timeout(Duration::from_millis(ms));
    }

    if let Some(ms) = cli.write_timeout_ms.or(file.server.write_timeout_ms) {
        builder = builder.write_timeout(Duration::from_millis(ms));
    }

    let class = cli
        .class
        .clone()
        .or(file.client.class)
        .unwrap_or_else(|| DEFAULT_CLASS.to_string());

    // Flags: CLI replaces file; default matches a data-saving client
    let names = if cli.flags.is_empty() {
        file.client.flags
    } else {
        Some(cli.flags.clone())
    };
    let flags = match names {
        Some(names) => parse_flags(&names)?,
        None => ClientFlags::CONFIG_DATA_SET | ClientFlags::CONFIG_FILE,
    };

    Ok(MergedConfig {
        options: builder.build(),
        class,
        flags,
    })
}

fn parse_flags(names: &[String]) -> Result<ClientFlags> {
    let mut flags = ClientFlags::NONE;
    for name in names {
        flags |= match name.as_str() {
            "config-data-set" => ClientFlags::CONFIG_DATA_SET,
            "config-file" => ClientFlags::CONFIG_FILE,
            "server-interface" => ClientFlags::SERVER_INTERFACE,
            "no-autoresume" => ClientFlags::NO_AUTORESUME,
            "terminal" => ClientFlags::TERMINAL,
            "no-start-server" => ClientFlags::NO_START_SERVER,
            other => anyhow::bail!("invalid client flag: {}", other),
        };
    }
    Ok(flags)
}
