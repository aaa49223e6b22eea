use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lash-client")]
#[command(version)]
#[command(about = "Talk to a LASH session daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join a session as a simple client that saves and restores a data file
    Simple(SimpleArgs),

    /// Start a program through a forked loader, with session options
    Exec(ExecArgs),
}

#[derive(Args)]
pub struct SimpleArgs {
    /// Name announced to the daemon (defaults to lsec_<pid>)
    #[arg(long)]
    pub name: Option<String>,

    /// JACK client name to announce
    #[arg(long)]
    pub jack_name: Option<String>,

    /// ALSA sequencer client id to announce
    #[arg(long)]
    pub alsa_id: Option<u8>,

    /// Seconds between mailbox polls
    #[arg(long, default_value_t = 1)]
    pub poll_interval: u64,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args)]
pub struct ExecArgs {
    /// Program to start
    pub program: String,

    /// Arguments to pass to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Project the program joins
    #[arg(long, default_value = "")]
    pub project: String,

    /// Daemon address handed to the program
    #[arg(long, default_value = "localhost")]
    pub server: String,

    /// Client id handed to the program (random if omitted)
    #[arg(long)]
    pub id: Option<uuid::Uuid>,

    /// Directory to start the program in (defaults to the current one)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Run the program inside an xterm
    #[arg(long)]
    pub terminal: bool,
}

/// How to reach the daemon and who to be
#[derive(Args)]
pub struct ConnectArgs {
    /// Daemon host, optionally with :port
    #[arg(long, env = "LASH_SERVER")]
    pub server: Option<String>,

    /// Service name or port
    #[arg(long, env = "LASH_SERVICE")]
    pub service: Option<String>,

    /// Client class
    #[arg(long)]
    pub class: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Send timeout in milliseconds
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Client flag (config-data-set, config-file, no-autoresume, terminal; can be repeated)
    #[arg(long = "flag")]
    pub flags: Vec<String>,
}
