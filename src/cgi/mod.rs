//! CGI child process spawning.
//!
//! Each child gets three socketpair pipes (stdin/stdout/stderr). The parent
//! ends are nonblocking and owned as plain fds so the reactor can watch
//! them; the child ends are handed to `Command` as stdio. The child runs in
//! the script's directory with exactly the meta-variable environment.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::process::{Child, Command, Stdio};

use crate::http::CgiMetaVariables;
use crate::router::CgiContext;

#[derive(Debug)]
pub struct SpawnedCgi {
    pub child: Child,
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// php-cgi refuses to run without the `REDIRECT_STATUS` convention.
pub fn is_php_cgi(executor_path: &str) -> bool {
    let base = executor_path.rsplit('/').next().unwrap_or(executor_path);
    base.contains("php-cgi")
}

fn nonblocking_pair() -> io::Result<(OwnedFd, UnixStream)> {
    let (parent, child) = UnixStream::pair()?;
    parent.set_nonblocking(true)?;
    Ok((OwnedFd::from(parent), child))
}

/// Forks the interpreter for `ctx.script_filename`. The caller owns the
/// returned pipes and is responsible for reaping the child.
pub fn spawn_cgi(ctx: &CgiContext, meta: &CgiMetaVariables) -> io::Result<SpawnedCgi> {
    let (stdin_parent, stdin_child) = nonblocking_pair()?;
    let (stdout_parent, stdout_child) = nonblocking_pair()?;
    let (stderr_parent, stderr_child) = nonblocking_pair()?;

    let working_dir = ctx.script_filename.parent_dir();

    let child = Command::new(&ctx.executor_path)
        .arg(ctx.script_filename.as_str())
        .env_clear()
        .envs(meta.all())
        .current_dir(working_dir.as_path())
        .stdin(Stdio::from(OwnedFd::from(stdin_child)))
        .stdout(Stdio::from(OwnedFd::from(stdout_child)))
        .stderr(Stdio::from(OwnedFd::from(stderr_child)))
        .spawn()?;

    Ok(SpawnedCgi {
        child,
        stdin: stdin_parent,
        stdout: stdout_parent,
        stderr: stderr_parent,
    })
}

/// Collects the child without blocking the event loop: a child that has
/// not exited is killed first (SIGKILL), then waited.
pub fn reap_child(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn php_cgi_detection() {
        assert!(is_php_cgi("/usr/bin/php-cgi"));
        assert!(is_php_cgi("/opt/php/php-cgi8.2"));
        assert!(!is_php_cgi("/usr/bin/python3"));
    }
}
