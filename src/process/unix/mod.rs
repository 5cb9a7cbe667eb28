use super::{Delivery, ProcessTable, SignalError, SpawnError, SpawnRequest, Termination};
use crate::pid::Pid;

use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd,
};

use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::process::CommandExt,
    process::{Command, Stdio},
};

/// The live process table of this host.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixProcessTable;

/// Check if a process with the given PID exists.
///
/// `kill(pid, 0)` delivers nothing and only reports whether the target could
/// be signalled. `EPERM` means the process exists but belongs to someone
/// else, so it counts as alive. Zombies are alive until reaped.
pub fn is_pid_alive(pid: Pid) -> bool {
    match kill(unistd::Pid::from_raw(pid.get()), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn send(pid: Pid, kind: Termination) -> Result<Delivery, SignalError> {
    let signal = match kind {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forced => Signal::SIGKILL,
    };

    match kill(unistd::Pid::from_raw(pid.get()), signal) {
        Ok(()) => {
            log::debug!("sent {signal} to pid {pid}");
            Ok(Delivery::Sent)
        }
        Err(Errno::ESRCH) => {
            log::debug!("pid {pid} already gone, {signal} not sent");
            Ok(Delivery::NoSuchProcess)
        }
        Err(err) => Err(SignalError {
            pid,
            kind,
            reason: err.desc().to_string(),
        }),
    }
}

fn open_log(request: &SpawnRequest) -> Result<fs::File, SpawnError> {
    if let Some(parent) = request.log_file.parent() {
        fs::create_dir_all(parent).map_err(|source| SpawnError::LogDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&request.log_file)
        .map_err(|source| SpawnError::LogFile {
            path: request.log_file.clone(),
            source,
        })
}

impl ProcessTable for UnixProcessTable {
    fn is_alive(&self, pid: Pid) -> bool {
        is_pid_alive(pid)
    }

    fn signal_graceful(&self, pid: Pid) -> Result<Delivery, SignalError> {
        send(pid, Termination::Graceful)
    }

    fn signal_forced(&self, pid: Pid) -> Result<Delivery, SignalError> {
        send(pid, Termination::Forced)
    }

    fn spawn_detached(&self, request: &SpawnRequest) -> Result<Pid, SpawnError> {
        let stdout = open_log(request)?;
        let stderr = stdout.try_clone().map_err(|source| SpawnError::LogFile {
            path: request.log_file.clone(),
            source,
        })?;

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.cwd);

        for key in &request.env_remove {
            cmd.env_remove(key);
        }

        cmd.envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // New session: no controlling terminal, no SIGHUP when ours goes away.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let launch_error = |source: io::Error| SpawnError::Launch {
            program: request.program.clone(),
            source,
        };

        let child = cmd.spawn().map_err(launch_error)?;
        let raw = i32::try_from(child.id()).map_err(|_| {
            launch_error(io::Error::new(io::ErrorKind::InvalidData, "pid out of range"))
        })?;

        // Dropping the handle neither waits for nor kills the child.
        drop(child);

        Pid::new(raw).ok_or_else(|| {
            launch_error(io::Error::new(io::ErrorKind::InvalidData, "spawned pid is not positive"))
        })
    }
}
