pub mod simulated;
pub mod unix;

use crate::pid::Pid;

use std::{collections::BTreeMap, io, path::PathBuf, thread, time::Duration};

pub use unix::UnixProcessTable;

/// Result of a best-effort signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The target was already gone; nothing to do.
    NoSuchProcess,
}

/// Which termination request was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM, may be ignored by the target
    Graceful,
    /// SIGKILL
    Forced,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to send {kind:?} termination to pid {pid}: {reason}")]
pub struct SignalError {
    pub pid: Pid,
    pub kind: Termination,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("unable to create log directory '{}': {source}", path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to open log file '{}': {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Everything needed to launch the service once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Current directory of the child
    pub cwd: PathBuf,
    /// Variables added to (or overriding) the inherited environment
    pub env: BTreeMap<String, String>,
    /// Variables removed from the inherited environment
    pub env_remove: Vec<String>,
    /// Receives stdout and stderr, opened for appending
    pub log_file: PathBuf,
}

impl SpawnRequest {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Access to the operating system process table.
pub trait ProcessTable {
    /// Whether `pid` currently names a process, zombies and processes of
    /// other users included.
    fn is_alive(&self, pid: Pid) -> bool;

    fn signal_graceful(&self, pid: Pid) -> Result<Delivery, SignalError>;

    fn signal_forced(&self, pid: Pid) -> Result<Delivery, SignalError>;

    /// Launch the request in its own session so it outlives the caller.
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<Pid, SpawnError>;

    /// Block between liveness polls.
    fn pause(&self, duration: Duration) {
        thread::sleep(duration)
    }

    fn signal(&self, pid: Pid, kind: Termination) -> Result<Delivery, SignalError> {
        match kind {
            Termination::Graceful => self.signal_graceful(pid),
            Termination::Forced => self.signal_forced(pid),
        }
    }
}

impl<T: ProcessTable + ?Sized> ProcessTable for &T {
    fn is_alive(&self, pid: Pid) -> bool {
        (**self).is_alive(pid)
    }

    fn signal_graceful(&self, pid: Pid) -> Result<Delivery, SignalError> {
        (**self).signal_graceful(pid)
    }

    fn signal_forced(&self, pid: Pid) -> Result<Delivery, SignalError> {
        (**self).signal_forced(pid)
    }

    fn spawn_detached(&self, request: &SpawnRequest) -> Result<Pid, SpawnError> {
        (**self).spawn_detached(request)
    }

    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}
