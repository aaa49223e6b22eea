//! Program launcher process
//!
//! A session daemon forks a loader early in its life and asks it to start
//! client programs over a private socket pair. The daemon never waits on
//! the programs; they belong to the loader, which ignores them.
//!
//! ```text
//! daemon ──Exec/Close──▶ loader ──fork+exec──▶ program --lash-project=.. --lash-server=.. --lash-id=..
//! ```

use std::borrow::Cow;
use std::ffi::CString;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, dup2, execvp, fork, setsid};

use crate::comm::{CommEvent, ExecParams};
use crate::error::{Error, Result};
use crate::transport;
use crate::types::ClientFlags;

const TERMINAL: &str = "xterm";
const TERMINAL_SHELL_TAIL: &str = "&& sh || sh";

/// Signals a loader is immune to, restored for the programs it starts
const LOADER_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGCHLD,
];

/// Daemon-side handle to a loader process
#[derive(Debug)]
pub struct Loader {
    server: Option<UnixStream>,
    loader: Option<UnixStream>,
    pid: Option<Pid>,
}

impl Loader {
    /// Allocate the control socket pair
    pub fn new() -> Result<Self> {
        let (server, loader) = UnixStream::pair().map_err(Error::LoaderSetup)?;
        Ok(Self {
            server: Some(server),
            loader: Some(loader),
            pid: None,
        })
    }

    /// Fork the loader process
    ///
    /// The child serves launch requests until told to close and then exits;
    /// it never returns from this call. Fork before starting other threads:
    /// the child keeps running Rust code.
    pub fn fork(&mut self) -> Result<()> {
        let loader = self
            .loader
            .take()
            .ok_or_else(|| Error::InvalidArgument("loader already forked".to_string()))?;

        // SAFETY: the child only runs the loader loop on its own socket and
        // leaves through `process::exit`.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                if let Some(server) = &self.server {
                    if let Err(e) = nix::unistd::close(server.as_raw_fd()) {
                        tracing::warn!(error = %e, "could not close server socket in loader");
                    }
                }
                std::process::exit(run(loader));
            }
            Ok(ForkResult::Parent { child }) => {
                drop(loader);
                tracing::info!(pid = child.as_raw(), "loader running");
                self.pid = Some(child);
                Ok(())
            }
            Err(e) => {
                self.loader = Some(loader);
                Err(Error::ForkFailed(e.to_string()))
            }
        }
    }

    /// Ask the loader to start a program
    pub fn load(&mut self, params: &ExecParams) -> Result<()> {
        let server = self.server.as_mut().ok_or(Error::NotConnected)?;
        tracing::debug!(program = params.program(), "sending exec request to loader");
        transport::send_event(server, &CommEvent::Exec(params.clone()))?;
        Ok(())
    }

    /// Pid of the forked loader
    pub fn pid(&self) -> Option<u32> {
        self.pid.map(|pid| pid.as_raw() as u32)
    }

    /// Tell the loader to exit and release the control socket
    ///
    /// Programs already started keep running.
    pub fn destroy(&mut self) {
        let Some(mut server) = self.server.take() else {
            return;
        };

        if self.pid.is_some() {
            if let Err(e) = transport::send_event(&mut server, &CommEvent::Close) {
                tracing::warn!(error = %e, "could not send close to loader");
            }
        }
        drop(server);
        self.loader = None;

        if let Some(pid) = self.pid {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    tracing::debug!(pid = pid.as_raw(), "loader still exiting");
                }
                Ok(status) => tracing::debug!(?status, "loader reaped"),
                Err(e) => tracing::debug!(pid = pid.as_raw(), error = %e, "waitpid on loader"),
            }
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A program launch, ready to hand to the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    /// Full argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Turn an exec request into the command line to run
///
/// The session options are appended to the requested arguments. Terminal
/// clients are wrapped in an xterm that drops to a shell when they exit.
pub fn launch_command(params: &ExecParams) -> Option<LaunchCommand> {
    let program = params.program()?.to_string();

    let mut argv = params.argv.clone();
    argv.push(format!("--lash-project={}", params.project));
    argv.push(format!("--lash-server={}", params.server));
    argv.push(format!("--lash-id={}", params.id.hyphenated()));

    if params.flags.contains(ClientFlags::TERMINAL) {
        let mut script = argv
            .iter()
            .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
            .collect::<Vec<_>>()
            .join(" ");
        script.push(' ');
        script.push_str(TERMINAL_SHELL_TAIL);

        return Some(LaunchCommand {
            program: TERMINAL.to_string(),
            args: vec!["-e".into(), "bash".into(), "-c".into(), script],
            working_dir: params.working_dir.clone(),
        });
    }

    Some(LaunchCommand {
        program,
        args: argv.split_off(1),
        working_dir: params.working_dir.clone(),
    })
}

/// Starts programs for the loader
pub trait Spawner {
    fn spawn(&self, command: &LaunchCommand) -> Result<()>;
}

/// Spawns real processes, detached from the loader
///
/// Each program runs in a forked child that is never waited on. The loader
/// ignores SIGCHLD, so the kernel reaps it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, command: &LaunchCommand) -> Result<()> {
        // everything the child needs is allocated before the fork
        let argv = command
            .argv()
            .into_iter()
            .map(CString::new)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| {
                Error::InvalidArgument(format!(
                    "argument of '{}' contains a NUL byte",
                    command.program
                ))
            })?;
        let stdin = File::open("/dev/null").map_err(|source| Error::ExecFailed {
            program: command.program.clone(),
            source,
        })?;

        // SAFETY: the child only makes system calls and logs before it
        // execs or leaves through `_exit`.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => exec_child(command, &argv, &stdin),
            Ok(ForkResult::Parent { child }) => {
                tracing::debug!(pid = child.as_raw(), program = %command.program, "program started");
                Ok(())
            }
            Err(e) => Err(Error::ForkFailed(e.to_string())),
        }
    }
}

/// Become the requested program; exits with status 1 if that fails
fn exec_child(command: &LaunchCommand, argv: &[CString], stdin: &File) -> ! {
    if let Err(e) = setsid() {
        tracing::warn!(error = %e, "could not create new process group");
    }

    if let Err(e) = chdir(&command.working_dir) {
        tracing::warn!(
            dir = %command.working_dir.display(),
            program = %command.program,
            error = %e,
            "could not change to working directory, starting in loader's directory"
        );
    }

    if let Err(e) = dup2(stdin.as_raw_fd(), libc::STDIN_FILENO) {
        tracing::warn!(error = %e, "could not redirect stdin");
    }

    for sig in LOADER_SIGNALS {
        // SAFETY: restoring the default disposition installs no handler code.
        if let Err(e) = unsafe { signal(sig, SigHandler::SigDfl) } {
            tracing::warn!(signal = ?sig, error = %e, "could not restore signal");
        }
    }

    let Err(e) = execvp(&argv[0], argv);
    tracing::error!(program = %command.program, error = %e, "exec failed");

    // SAFETY: leaves without running the loader's atexit handlers or
    // flushing buffers it shares with the loader.
    unsafe { libc::_exit(1) }
}

/// Loader process body; returns the exit status
fn run(stream: UnixStream) -> i32 {
    for sig in LOADER_SIGNALS {
        // SAFETY: ignoring a signal installs no handler code.
        if let Err(e) = unsafe { signal(sig, SigHandler::SigIgn) } {
            tracing::warn!(signal = ?sig, error = %e, "could not ignore signal");
        }
    }

    if let Err(e) = fcntl(stream.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
        tracing::warn!(error = %e, "could not set close-on-exec on loader socket");
    }

    serve_to_exit(stream, &ProcessSpawner)
}

/// Serve until done and map the outcome to an exit status
///
/// A panic never unwinds past this point; in the loader that would run the
/// daemon's stack frames inherited through fork.
fn serve_to_exit(mut stream: UnixStream, spawner: &dyn Spawner) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(|| serve(&mut stream, spawner))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "loader failed");
            1
        }
        Err(_) => {
            tracing::error!("loader panicked");
            1
        }
    }
}

/// Handle launch requests from `stream` until Close or end of stream
pub fn serve(stream: &mut UnixStream, spawner: &dyn Spawner) -> Result<()> {
    loop {
        match transport::recv_event(stream) {
            Ok(CommEvent::Exec(params)) => execute(&params, spawner),
            Ok(CommEvent::Close) => {
                tracing::debug!("loader received close");
                return Ok(());
            }
            Ok(other) => {
                tracing::warn!(kind = other.name(), "loader ignoring unexpected message");
            }
            Err(Error::UnknownMessage(tag)) => {
                tracing::warn!(tag, "loader ignoring unknown message");
            }
            Err(Error::ConnectionClosed) => {
                tracing::info!("server closed loader socket");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Start one program; failures are only logged
pub fn execute(params: &ExecParams, spawner: &dyn Spawner) {
    let Some(command) = launch_command(params) else {
        tracing::warn!(id = %params.id, "exec request without a program");
        return;
    };

    tracing::debug!(
        argv = ?command.argv(),
        dir = %command.working_dir.display(),
        flags = %params.flags,
        "executing"
    );

    if let Err(e) = spawner.spawn(&command) {
        tracing::warn!(error = %e, "could not start program");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        launched: Mutex<Vec<LaunchCommand>>,
    }

    impl Spawner for Recorder {
        fn spawn(&self, command: &LaunchCommand) -> Result<()> {
            self.launched.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    fn params(flags: ClientFlags, argv: &[&str]) -> ExecParams {
        ExecParams {
            flags,
            id: Uuid::parse_str("0f0e0d0c-0b0a-4908-8706-050403020100").unwrap(),
            working_dir: PathBuf::from("/tmp"),
            server: "localhost:9999".to_string(),
            project: "proj1".to_string(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_session_options_appended() {
        let p = params(ClientFlags::NONE, &["myclient", "--foo"]);
        let command = launch_command(&p).unwrap();

        assert_eq!(command.program, "myclient");
        assert_eq!(
            command.argv(),
            vec![
                "myclient",
                "--foo",
                "--lash-project=proj1",
                "--lash-server=localhost:9999",
                "--lash-id=0f0e0d0c-0b0a-4908-8706-050403020100",
            ]
        );
        assert_eq!(command.working_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_terminal_wrap() {
        let p = params(ClientFlags::TERMINAL, &["my client", "--foo"]);
        let command = launch_command(&p).unwrap();

        assert_eq!(command.program, "xterm");
        assert_eq!(&command.args[..3], ["-e", "bash", "-c"]);
        let script = &command.args[3];
        assert!(script.starts_with("'my client' --foo --lash-project=proj1"));
        assert!(script.ends_with(" && sh || sh"));
    }

    #[test]
    fn test_empty_argv_launches_nothing() {
        assert_eq!(launch_command(&params(ClientFlags::NONE, &[])), None);

        let recorder = Recorder::default();
        execute(&params(ClientFlags::NONE, &[]), &recorder);
        assert!(recorder.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_serve_until_close() {
        let (mut daemon, mut loader) = UnixStream::pair().unwrap();
        let recorder = Recorder::default();

        let exec = CommEvent::Exec(params(ClientFlags::NONE, &["myclient", "--foo"]));
        transport::send_event(&mut daemon, &exec).unwrap();
        transport::send_event(&mut daemon, &CommEvent::Ping).unwrap();
        transport::send_event(&mut daemon, &exec).unwrap();
        transport::send_event(&mut daemon, &CommEvent::Close).unwrap();

        serve(&mut loader, &recorder).unwrap();

        let launched = recorder.launched.lock().unwrap();
        assert_eq!(launched.len(), 2);
        assert_eq!(launched[0].argv()[4], "--lash-id=0f0e0d0c-0b0a-4908-8706-050403020100");
    }

    #[test]
    fn test_serve_ends_when_daemon_goes_away() {
        let (daemon, mut loader) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || serve(&mut loader, &Recorder::default()));
        drop(daemon);
        assert!(handle.join().unwrap().is_ok());
    }

    struct Panicker;

    impl Spawner for Panicker {
        fn spawn(&self, _command: &LaunchCommand) -> Result<()> {
            panic!("spawner blew up");
        }
    }

    #[test]
    fn test_panic_becomes_exit_status() {
        let (mut daemon, loader) = UnixStream::pair().unwrap();
        let exec = CommEvent::Exec(params(ClientFlags::NONE, &["myclient"]));
        transport::send_event(&mut daemon, &exec).unwrap();

        assert_eq!(serve_to_exit(loader, &Panicker), 1);
    }

    #[test]
    fn test_serve_to_exit_status() {
        let (mut daemon, loader) = UnixStream::pair().unwrap();
        transport::send_event(&mut daemon, &CommEvent::Close).unwrap();
        assert_eq!(serve_to_exit(loader, &Recorder::default()), 0);

        let (mut daemon, loader) = UnixStream::pair().unwrap();
        transport::send_all(&mut daemon, &[0xff; 3]).unwrap();
        assert_eq!(serve_to_exit(loader, &Recorder::default()), 1);
    }

    #[test]
    fn test_missing_program_with_sigchld_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");

        // SAFETY: ignoring a signal installs no handler code.
        let previous = unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }.unwrap();

        let missing = LaunchCommand {
            program: "/nonexistent/lash-test-program".to_string(),
            args: Vec::new(),
            working_dir: PathBuf::from("/"),
        };
        let missing_result = ProcessSpawner.spawn(&missing);

        let touch = LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"touch "$0""#.to_string(),
                marker.display().to_string(),
            ],
            working_dir: dir.path().to_path_buf(),
        };
        let touch_result = ProcessSpawner.spawn(&touch);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }

        // SAFETY: restores the disposition saved above.
        unsafe { signal(Signal::SIGCHLD, previous) }.unwrap();

        assert!(missing_result.is_ok());
        assert!(touch_result.is_ok());
        assert!(marker.exists());
    }

    #[test]
    fn test_nul_in_argument_rejected() {
        let command = LaunchCommand {
            program: "myclient".to_string(),
            args: vec!["bad\0arg".to_string()],
            working_dir: PathBuf::from("/"),
        };
        assert!(matches!(
            ProcessSpawner.spawn(&command),
            Err(Error::InvalidArgument(_))
        ));
    }
}
