//! Forked loader process
//!
//! Kept in its own test binary with a single test so the fork happens with
//! as few threads alive as possible.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;

use lash::{ClientFlags, ExecParams, Loader};
use tempfile::TempDir;
use uuid::Uuid;

use common::wait_until;

fn shell_exec(dir: &TempDir, script: &str, target: &PathBuf) -> ExecParams {
    ExecParams {
        flags: ClientFlags::NONE,
        id: Uuid::new_v4(),
        working_dir: dir.path().to_path_buf(),
        server: "localhost:9999".to_string(),
        project: "proj1".to_string(),
        // the session options land after $0 and are ignored by the script
        argv: vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            target.display().to_string(),
        ],
    }
}

#[test]
fn test_loader_starts_programs() {
    let dir = TempDir::new().unwrap();
    let mut loader = Loader::new().unwrap();
    loader.fork().unwrap();
    assert!(loader.pid().is_some());

    // working directory and the injected options
    let cwd_file = dir.path().join("cwd");
    let params = shell_exec(&dir, r#"pwd > "$0"; echo "$@" >> "$0""#, &cwd_file);
    let id = params.id;
    loader.load(&params).unwrap();

    assert!(wait_until(|| {
        fs::read_to_string(&cwd_file).is_ok_and(|s| s.lines().count() == 2)
    }));
    let output = fs::read_to_string(&cwd_file).unwrap();
    let mut lines = output.lines();
    assert_eq!(
        fs::canonicalize(lines.next().unwrap()).unwrap(),
        fs::canonicalize(dir.path()).unwrap()
    );
    assert_eq!(
        lines.next().unwrap(),
        format!("--lash-project=proj1 --lash-server=localhost:9999 --lash-id={id}")
    );

    // a program that exits at once leaves nothing for the daemon to do
    let done_file = dir.path().join("done");
    loader
        .load(&shell_exec(&dir, r#"touch "$0"; exit 0"#, &done_file))
        .unwrap();
    assert!(wait_until(|| done_file.exists()));

    // a missing program is only logged by the loader
    let mut missing = shell_exec(&dir, "", &done_file);
    missing.argv = vec!["/nonexistent/lash-test-program".to_string()];
    loader.load(&missing).unwrap();

    let after_file = dir.path().join("after");
    loader
        .load(&shell_exec(&dir, r#"touch "$0""#, &after_file))
        .unwrap();
    assert!(wait_until(|| after_file.exists()));

    loader.destroy();
    assert!(loader.load(&missing).is_err());
}
