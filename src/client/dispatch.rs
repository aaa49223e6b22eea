//! Callback-style session handling
//!
//! Instead of polling the mailboxes, an application registers one callback
//! per kind of request and calls [`Client::dispatch`] whenever
//! [`Client::wait`] returns (or on its own event loop tick).
//!
//! Save and restore callbacks return whether they succeeded. On success the
//! request event is sent back to the daemon as the acknowledgement.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::types::{ClientFlags, EventType};

use super::Client;
use super::session::lock;

type DirCallback = Box<dyn FnMut(&str) -> bool + Send>;
type NameCallback = Box<dyn FnMut(&str) + Send>;
type SignalCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub(crate) struct Callbacks {
    save: Option<DirCallback>,
    load: Option<DirCallback>,
    save_data_set: Option<Box<dyn FnMut(&mut ConfigWriter) -> bool + Send>>,
    load_data_set: Option<Box<dyn FnMut(Vec<Config>) -> bool + Send>>,
    quit: Option<SignalCallback>,
    name_change: Option<NameCallback>,
    project_change: Option<NameCallback>,
    path_change: Option<NameCallback>,
    server_lost: Option<SignalCallback>,
    control: Option<Box<dyn FnMut(&Event) + Send>>,
}

/// Collects the configs a data-set save produces
#[derive(Debug, Default)]
pub struct ConfigWriter {
    configs: Vec<Config>,
}

impl ConfigWriter {
    pub fn write(&mut self, config: Config) {
        self.configs.push(config);
    }

    pub fn write_raw(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.write(Config::with_value(key, value));
    }

    pub fn write_int(&mut self, key: impl Into<String>, value: u32) {
        let mut config = Config::new(key);
        config.set_value_int(value);
        self.write(config);
    }

    pub fn write_float(&mut self, key: impl Into<String>, value: f32) {
        let mut config = Config::new(key);
        config.set_value_float(value);
        self.write(config);
    }

    pub fn write_double(&mut self, key: impl Into<String>, value: f64) {
        let mut config = Config::new(key);
        config.set_value_double(value);
        self.write(config);
    }

    pub fn write_string(&mut self, key: impl Into<String>, value: &str) {
        let mut config = Config::new(key);
        config.set_value_string(value);
        self.write(config);
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn into_configs(self) -> Vec<Config> {
        self.configs
    }
}

impl Client {
    /// Connect using the process command line
    ///
    /// `argv` is scanned for `--lash-*` options the same way
    /// [`extract_args`](crate::extract_args) does.
    pub fn open(class: &str, flags: ClientFlags, argv: Vec<String>) -> Result<Client> {
        let mut argv = argv;
        let args = crate::args::extract_args(&mut argv);
        Client::try_init(
            &args,
            class,
            flags,
            crate::Protocol::CURRENT,
            &crate::ClientOptions::from_env(),
        )
    }

    /// Block until an event or config is pending or the session has ended
    pub fn wait(&self) {
        self.session.wait();
    }

    /// Handle every pending event
    ///
    /// Callbacks run on the calling thread and must not register callbacks
    /// themselves.
    pub fn dispatch(&self) {
        while let Some(event) = self.get_event() {
            self.handle(event);
        }
    }

    /// Handle the oldest pending event; returns whether more are pending
    pub fn dispatch_once(&self) -> bool {
        if let Some(event) = self.get_event() {
            self.handle(event);
        }
        self.pending_event_count() > 0
    }

    fn handle(&self, event: Event) {
        let mut callbacks = lock(&self.callbacks);
        let string = event.string().unwrap_or_default().to_string();

        match event.event_type() {
            EventType::SaveFile => {
                if let Some(save) = callbacks.save.as_mut() {
                    let ok = save(&string);
                    drop(callbacks);
                    self.acknowledge(event, ok);
                }
            }
            EventType::RestoreFile => {
                if let Some(load) = callbacks.load.as_mut() {
                    let ok = load(&string);
                    drop(callbacks);
                    self.acknowledge(event, ok);
                }
            }
            EventType::SaveDataSet => {
                if let Some(save) = callbacks.save_data_set.as_mut() {
                    let mut writer = ConfigWriter::default();
                    let ok = save(&mut writer);
                    drop(callbacks);
                    for config in writer.into_configs() {
                        self.send_config(config);
                    }
                    self.acknowledge(event, ok);
                }
            }
            EventType::RestoreDataSet => {
                if let Some(load) = callbacks.load_data_set.as_mut() {
                    let ok = load(self.session.drain_configs());
                    drop(callbacks);
                    self.acknowledge(event, ok);
                }
            }
            EventType::Quit => {
                if let Some(quit) = callbacks.quit.as_mut() {
                    quit();
                }
            }
            EventType::ServerLost => {
                if let Some(lost) = callbacks.server_lost.as_mut() {
                    lost();
                }
            }
            EventType::ClientName => {
                if let Some(changed) = callbacks.name_change.as_mut() {
                    changed(&string);
                }
            }
            kind if kind.is_control() && self.is_controller() => {
                if let Some(control) = callbacks.control.as_mut() {
                    control(&event);
                }
            }
            EventType::ProjectName => {
                if let Some(changed) = callbacks.project_change.as_mut() {
                    changed(&string);
                }
            }
            EventType::ProjectDir => {
                if let Some(changed) = callbacks.path_change.as_mut() {
                    changed(&string);
                }
            }
            other => {
                tracing::debug!(event_type = ?other, "no handler for event");
            }
        }
    }

    fn acknowledge(&self, event: Event, ok: bool) {
        if ok {
            self.send_event(event);
        } else {
            tracing::warn!(event_type = ?event.event_type(), "callback failed, not acknowledging");
        }
    }

    fn is_controller(&self) -> bool {
        self.identity().flags.contains(ClientFlags::SERVER_INTERFACE)
    }

    fn register<F>(&self, install: F) -> Result<()>
    where
        F: FnOnce(&mut Callbacks),
    {
        if !self.server_connected() {
            return Err(Error::NotConnected);
        }
        install(&mut lock(&self.callbacks));
        Ok(())
    }

    /// Called with the directory to save into
    pub fn set_save_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&str) -> bool + Send + 'static,
    {
        self.register(|c| c.save = Some(Box::new(callback)))
    }

    /// Called with the directory to restore from
    pub fn set_load_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&str) -> bool + Send + 'static,
    {
        self.register(|c| c.load = Some(Box::new(callback)))
    }

    /// Called to store state on the daemon as configs
    pub fn set_save_data_set_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&mut ConfigWriter) -> bool + Send + 'static,
    {
        self.register(|c| c.save_data_set = Some(Box::new(callback)))
    }

    /// Called with the configs the daemon sent back
    pub fn set_load_data_set_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(Vec<Config>) -> bool + Send + 'static,
    {
        self.register(|c| c.load_data_set = Some(Box::new(callback)))
    }

    pub fn set_quit_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.register(|c| c.quit = Some(Box::new(callback)))
    }

    pub fn set_name_change_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.register(|c| c.name_change = Some(Box::new(callback)))
    }

    pub fn set_project_change_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.register(|c| c.project_change = Some(Box::new(callback)))
    }

    pub fn set_path_change_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.register(|c| c.path_change = Some(Box::new(callback)))
    }

    /// Called once when the daemon goes away
    ///
    /// Unlike the others this can be registered at any time, so a handler
    /// installed after the loss still sees the pending event.
    pub fn set_server_lost_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        lock(&self.callbacks).server_lost = Some(Box::new(callback));
        Ok(())
    }

    /// Called with project and client management events
    ///
    /// Only server-interface clients receive these.
    pub fn set_control_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&Event) + Send + 'static,
    {
        if !self.is_controller() {
            return Err(Error::InvalidArgument(
                "control callbacks need the server-interface flag".to_string(),
            ));
        }
        self.register(|c| c.control = Some(Box::new(callback)))
    }

    /// Ask the daemon to open the project stored at `path`
    pub fn control_load_project_path(&self, path: &str) {
        self.send_event(Event::with_string(EventType::ProjectAdd, path));
    }

    /// Rename `project` to `new_name`
    pub fn control_name_project(&self, project: &str, new_name: &str) {
        let mut event = Event::with_string(EventType::ProjectName, new_name);
        event.set_project(Some(project.to_string()));
        self.send_event(event);
    }

    /// Move `project` to the directory `new_dir`
    pub fn control_move_project(&self, project: &str, new_dir: &str) {
        let mut event = Event::with_string(EventType::ProjectDir, new_dir);
        event.set_project(Some(project.to_string()));
        self.send_event(event);
    }

    pub fn control_save_project(&self, project: &str) {
        let mut event = Event::new(EventType::Save);
        event.set_project(Some(project.to_string()));
        self.send_event(event);
    }

    pub fn control_close_project(&self, project: &str) {
        let mut event = Event::new(EventType::ProjectRemove);
        event.set_project(Some(project.to_string()));
        self.send_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_writer() {
        let mut writer = ConfigWriter::default();
        assert!(writer.is_empty());

        writer.write_int("volume", 75);
        writer.write_string("name", "lead");
        writer.write_raw("blob", vec![1, 2, 3]);
        writer.write_double("gain", 0.25);
        assert_eq!(writer.len(), 4);

        let configs = writer.into_configs();
        assert_eq!(configs[0].value_int(), Some(75));
        assert_eq!(configs[1].value_string(), Some("lead"));
        assert_eq!(configs[2].value(), Some(&[1, 2, 3][..]));
        assert_eq!(configs[3].value_double(), Some(0.25));
    }
}
