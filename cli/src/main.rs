use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};
use config::{load_config, merge_config};
use error::{CliResult, to_exit_code};

fn main() -> ExitCode {
    // session options come first, before clap sees the command line
    let mut argv: Vec<String> = std::env::args().collect();
    let session = lash::extract_args(&mut argv);

    let cli = Cli::parse_from(argv);

    // Initialize tracing based on verbosity
    let filter = if cli.verbose {
        "lash=debug,lash_cli=debug"
    } else {
        "lash=warn,lash_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    to_exit_code(run(cli, session))
}

fn run(cli: Cli, session: lash::Args) -> CliResult<()> {
    let file_config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simple(args) => {
            let config = merge_config(file_config, &args.connect)?;
            commands::simple::execute(args, config, session)
        }
        Commands::Exec(args) => commands::exec::execute(args),
    }
}
