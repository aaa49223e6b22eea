use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use lash::{Args, Client, Config, Event, EventType, Protocol};

use crate::cli::SimpleArgs;
use crate::config::MergedConfig;
use crate::error::CliResult;

const DATA_FILE: &str = "simple-client.data";
const DATA_FILE_CONTENTS: &str = "lash simple client data";
const DATA_SET_KEY: &str = "test config";
const DATA_SET_VALUE: &str = "this is some configuration data";

pub fn execute(args: SimpleArgs, config: MergedConfig, session: Args) -> CliResult<()> {
    let client = Client::try_init(
        &session,
        &config.class,
        config.flags,
        Protocol::CURRENT,
        &config.options,
    )
    .context("could not initialise lash")?;

    tracing::info!(server = client.server_name(), "connected");

    let name = args
        .name
        .unwrap_or_else(|| format!("lsec_{}", std::process::id()));
    client.send_event(Event::with_string(EventType::ClientName, name.as_str()));
    client.jack_client_name(args.jack_name.as_deref().unwrap_or(&name));
    if let Some(id) = args.alsa_id {
        client.alsa_client_id(id);
    }

    let interval = Duration::from_secs(args.poll_interval);
    loop {
        while let Some(event) = client.get_event() {
            tracing::debug!(
                event_type = ?event.event_type(),
                string = event.string(),
                "got event"
            );

            match event.event_type() {
                EventType::SaveDataSet => {
                    let mut config = Config::new(DATA_SET_KEY);
                    config.set_value_string(DATA_SET_VALUE);
                    client.send_config(config);
                    client.send_event(event);
                }
                EventType::RestoreDataSet => {
                    while let Some(config) = client.get_config() {
                        tracing::info!(
                            key = config.key(),
                            size = config.value_size(),
                            "restored config"
                        );
                    }
                    client.send_event(event);
                }
                EventType::SaveFile => {
                    let dir = event.string().unwrap_or_default();
                    match save_file(Path::new(dir)) {
                        Ok(()) => client.send_event(event),
                        Err(e) => tracing::warn!(error = %e, "save failed, not acknowledging"),
                    }
                }
                EventType::RestoreFile => {
                    let dir = event.string().unwrap_or_default();
                    restore_file(Path::new(dir));
                    client.send_event(event);
                }
                EventType::Quit => {
                    tracing::info!("server told us to quit");
                    return Ok(());
                }
                EventType::ServerLost => {
                    tracing::info!("server connection lost");
                    return Ok(());
                }
                other => {
                    tracing::warn!(event_type = ?other, "unhandled event");
                }
            }
        }

        thread::sleep(interval);
    }
}

fn save_file(dir: &Path) -> CliResult<()> {
    let path = dir.join(DATA_FILE);
    fs::write(&path, DATA_FILE_CONTENTS)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote data file");
    Ok(())
}

fn restore_file(dir: &Path) {
    let path = dir.join(DATA_FILE);
    match fs::read_to_string(&path) {
        Ok(data) => tracing::info!(path = %path.display(), data = %data, "read data file"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not read data file"),
    }
}
