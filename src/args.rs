//! The `--lash-*` command line options
//!
//! Programs launched by a session daemon receive their session identity as
//! command line options. [`extract_args`] pulls them out of the process
//! arguments before the application's own parser sees them.

use uuid::Uuid;

use crate::types::ClientFlags;

const SERVER_OPT: &str = "--lash-server=";
const PROJECT_OPT: &str = "--lash-project=";
const ID_OPT: &str = "--lash-id=";
const NO_AUTORESUME_OPT: &str = "--lash-no-autoresume";
const NO_START_SERVER_OPT: &str = "--lash-no-start-server";

/// Session options found on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub project: Option<String>,
    /// `host` or `host:port`
    pub server: Option<String>,
    pub id: Option<Uuid>,
    pub flags: ClientFlags,
    /// The remaining arguments, `argv[0]` included
    pub argv: Vec<String>,
}

impl Args {
    /// Args carrying only the given command line, with no session options
    pub fn from_argv(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }
}

/// Strip and interpret the `--lash-*` options in `argv`
///
/// `argv[0]` is never inspected. The remaining arguments are compacted in
/// place, keeping their order, and a copy is stored in the returned [`Args`].
pub fn extract_args(argv: &mut Vec<String>) -> Args {
    let mut args = Args::default();

    let mut index = 0;
    argv.retain(|arg| {
        index += 1;
        index == 1 || !take_option(&mut args, arg)
    });

    args.argv = argv.clone();
    args
}

/// Record `arg` in `args` if it is a session option; returns whether it was
fn take_option(args: &mut Args, arg: &str) -> bool {
    if let Some(server) = strip_prefix_ignore_case(arg, SERVER_OPT) {
        tracing::debug!(server, "server from command line");
        args.server = Some(server.to_string());
        return true;
    }

    if let Some(project) = strip_prefix_ignore_case(arg, PROJECT_OPT) {
        tracing::debug!(project, "project from command line");
        args.project = Some(project.to_string());
        return true;
    }

    if let Some(id) = arg.strip_prefix(ID_OPT) {
        match Uuid::parse_str(id) {
            Ok(id) => args.id = Some(id),
            Err(e) => tracing::warn!(id, error = %e, "ignoring invalid --lash-id"),
        }
        return true;
    }

    if arg.starts_with(NO_AUTORESUME_OPT) {
        tracing::debug!("no-autoresume from command line");
        args.flags.insert(ClientFlags::NO_AUTORESUME);
        return true;
    }

    if arg.starts_with(NO_START_SERVER_OPT) {
        tracing::debug!("no-start-server from command line");
        args.flags.insert(ClientFlags::NO_START_SERVER);
        return true;
    }

    false
}

fn strip_prefix_ignore_case<'a>(arg: &'a str, prefix: &str) -> Option<&'a str> {
    let head = arg.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &arg[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extracts_and_compacts() {
        let id = Uuid::new_v4();
        let id_opt = format!("--lash-id={id}");
        let mut v = argv(&[
            "synth",
            "-v",
            "--lash-server=studio:9000",
            "input.wav",
            &id_opt,
            "--lash-project=proj1",
            "--lash-no-autoresume",
            "--gain=3",
        ]);

        let args = extract_args(&mut v);

        assert_eq!(v, argv(&["synth", "-v", "input.wav", "--gain=3"]));
        assert_eq!(args.argv, v);
        assert_eq!(args.server.as_deref(), Some("studio:9000"));
        assert_eq!(args.project.as_deref(), Some("proj1"));
        assert_eq!(args.id, Some(id));
        assert_eq!(args.flags, ClientFlags::NO_AUTORESUME);
    }

    #[test]
    fn test_case_insensitive_server_and_project() {
        let mut v = argv(&["app", "--LASH-Server=host", "--Lash-Project=p"]);
        let args = extract_args(&mut v);
        assert_eq!(v, argv(&["app"]));
        assert_eq!(args.server.as_deref(), Some("host"));
        assert_eq!(args.project.as_deref(), Some("p"));
    }

    #[test]
    fn test_program_name_untouched() {
        let mut v = argv(&["--lash-no-start-server", "--lash-no-start-server"]);
        let args = extract_args(&mut v);
        assert_eq!(v, argv(&["--lash-no-start-server"]));
        assert!(args.flags.contains(ClientFlags::NO_START_SERVER));
    }

    #[test]
    fn test_invalid_id_is_dropped() {
        let mut v = argv(&["app", "--lash-id=not-a-uuid", "x"]);
        let args = extract_args(&mut v);
        assert_eq!(v, argv(&["app", "x"]));
        assert_eq!(args.id, None);
    }

    #[test]
    fn test_empty_argv() {
        let mut v = Vec::new();
        let args = extract_args(&mut v);
        assert!(v.is_empty());
        assert_eq!(args, Args::default());
    }
}
