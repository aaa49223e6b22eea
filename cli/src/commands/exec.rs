use anyhow::Context;
use lash::{ClientFlags, ExecParams, Loader};
use uuid::Uuid;

use crate::cli::ExecArgs;
use crate::error::CliResult;

pub fn execute(args: ExecArgs) -> CliResult<()> {
    let working_dir = match args.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let mut flags = ClientFlags::NONE;
    if args.terminal {
        flags |= ClientFlags::TERMINAL;
    }

    let mut argv = Vec::with_capacity(args.args.len() + 1);
    argv.push(args.program);
    argv.extend(args.args);

    let params = ExecParams {
        flags,
        id: args.id.unwrap_or_else(Uuid::new_v4),
        working_dir,
        server: args.server,
        project: args.project,
        argv,
    };

    let mut loader = Loader::new().context("failed to create loader")?;
    loader.fork().context("failed to fork loader")?;
    tracing::info!(pid = loader.pid(), id = %params.id, "loader started");

    loader
        .load(&params)
        .context("failed to send exec request to loader")?;
    loader.destroy();

    println!("{}", params.id);
    Ok(())
}
