use std::process::ExitCode;

pub type CliResult<T> = anyhow::Result<T>;

/// Exit status when the daemon could not be reached at all
const EXIT_UNREACHABLE: u8 = 2;

/// Convert a CliResult to an ExitCode, printing errors to stderr
///
/// Failures to reach the daemon get their own status so session scripts
/// can tell "no daemon" apart from everything else.
pub fn to_exit_code(result: CliResult<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::from(exit_status(&e))
        }
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    let unreachable = error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<lash::Error>(),
            Some(lash::Error::ConnectFailed { .. } | lash::Error::ResolutionFailed { .. })
        )
    });
    if unreachable { EXIT_UNREACHABLE } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_status() {
        let plain = anyhow::anyhow!("bad flag");
        assert_eq!(exit_status(&plain), 1);

        let not_connected: CliResult<()> = Err(lash::Error::NotConnected.into());
        assert_eq!(exit_status(&not_connected.unwrap_err()), 1);

        let unreachable: CliResult<()> = Err(lash::Error::ConnectFailed {
            host: "localhost".to_string(),
            service: "lash".to_string(),
        })
        .context("could not initialise lash");
        assert_eq!(exit_status(&unreachable.unwrap_err()), EXIT_UNREACHABLE);
    }
}
