//! Host process helpers: port probes, process-table checks, daemon
//! spawning and signalling.

use std::ffi::OsStr;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Whether something is already listening on `host:port`.
pub fn port_in_use(host: &str, port: u16) -> bool {
    TcpStream::connect(format!("{}:{}", host, port)).is_ok()
}

/// Whether a process with `name` in its name is present in the process
/// table. Substring match, same semantics as `ps aux | grep <name>`.
pub fn process_running(name: &str) -> bool {
    use sysinfo::System;

    let system = System::new_all();
    system
        .processes()
        .values()
        .any(|p| p.name().to_string_lossy().contains(name))
}

/// Whether a process with the given PID exists.
pub fn process_exists(pid: i32) -> bool {
    use sysinfo::{ProcessesToUpdate, System};

    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All);

    system.process(sysinfo::Pid::from(pid as usize)).is_some()
}

/// Locate an executable on PATH.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    find_in_paths(name, &paths)
}

fn find_in_paths(name: &str, paths: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Spawn the daemon detached with discarded stdio and record its PID.
pub fn spawn_daemon(binary: &Path, pid_file: &Path) -> Result<u32> {
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create PID directory {}", parent.display()))?;
    }

    let child = Command::new(binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn daemon {}", binary.display()))?;

    let pid = child.id();
    std::fs::write(pid_file, pid.to_string())
        .with_context(|| format!("failed to write PID file {}", pid_file.display()))?;

    Ok(pid)
}

/// Read a PID previously recorded by [`spawn_daemon`].
pub fn read_pid_file(pid_file: &Path) -> Result<i32> {
    let pid_str = std::fs::read_to_string(pid_file)
        .with_context(|| format!("failed to read PID file {}", pid_file.display()))?;
    pid_str.trim().parse().context("invalid PID in file")
}

/// Wait up to `grace` for a process to leave the process table.
/// Returns true once it is gone, false if it is still there at the
/// deadline.
pub async fn wait_for_exit(pid: i32, grace: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + grace;
    loop {
        if !process_exists(pid) {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}

pub fn send_signal(pid: i32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), signal).context("failed to send signal to process")?;

    Ok(())
}
