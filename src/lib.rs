//! LASH - session management client library
//!
//! A program joins an audio session by connecting to the LASH daemon. The
//! daemon then asks it to save or restore its state, tells it about renames
//! and eventually asks it to quit. This crate provides:
//! - [`Client`]: the connection, served by a receiver and a sender thread,
//!   with polling ([`Client::get_event`]) and callback ([`Client::dispatch`])
//!   interfaces
//! - [`extract_args`]: removal of the `--lash-*` options the daemon passes
//!   to programs it starts
//! - [`Loader`]: the daemon's helper process that starts those programs
//!
//! # Example
//!
//! ```rust,no_run
//! use lash::{Client, ClientFlags, EventType, Protocol, extract_args};
//!
//! let mut argv: Vec<String> = std::env::args().collect();
//! let args = extract_args(&mut argv);
//!
//! let Some(client) = Client::init(&args, "my-synth", ClientFlags::CONFIG_FILE, Protocol::CURRENT)
//! else {
//!     // carry on without session management
//!     return;
//! };
//!
//! loop {
//!     while let Some(event) = client.get_event() {
//!         match event.event_type() {
//!             EventType::SaveFile => {
//!                 // write files into event.string(), then acknowledge
//!                 client.send_event(event);
//!             }
//!             EventType::Quit | EventType::ServerLost => return,
//!             _ => {}
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```

mod args;
mod client;
pub mod comm;
mod config;
mod error;
mod event;
#[cfg(unix)]
pub mod loader;
mod options;
mod protocol;
pub mod transport;
mod types;

// Re-export public types
pub use args::{Args, extract_args};
pub use client::{Client, ClientIdentity, ConfigWriter, SessionState};
pub use comm::{CommEvent, ConnectParams, ExecParams};
pub use config::Config;
pub use error::{Error, Result};
pub use event::Event;
#[cfg(unix)]
pub use loader::{LaunchCommand, Loader, ProcessSpawner, Spawner};
pub use options::{ClientOptions, ClientOptionsBuilder};
pub use protocol::Protocol;
pub use types::{ClientFlags, EventType};
