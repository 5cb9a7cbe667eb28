//! Start, stop and restart of the single tracked service instance.
//!
//! The supervisor owns no process handle. All it knows about the service is
//! the PID in the record, which is trusted only after a liveness check. There
//! is no locking around the record: two concurrent invocations may both see
//! the service as stopped and both spawn it, leaving the record with the last
//! writer's PID. A recorded PID that the OS has since reused for an unrelated
//! process is indistinguishable from the original service.

use crate::{
    config::Config,
    pid::{Pid, PidFile, PidStore},
    process::{
        Delivery, ProcessTable, SignalError, SpawnError, SpawnRequest, Termination,
        UnixProcessTable,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{io, path::PathBuf, time::Duration};

/// Bounds of the graceful-then-forced termination sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopPolicy {
    /// Wait between liveness polls after SIGTERM
    pub poll_interval: Duration,
    /// Polls before escalating to SIGKILL
    pub max_polls: u32,
    /// Single pause after SIGKILL before the final check
    pub kill_grace: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 10,
            kill_grace: Duration::from_secs(1),
        }
    }
}

impl StopPolicy {
    /// Upper bound on how long a stop may block.
    pub fn worst_case(&self) -> Duration {
        self.poll_interval * self.max_polls + self.kill_grace
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to start: {0}")]
    SpawnFailure(#[from] SpawnError),
    #[error("failed to stop, PID {0} is still running")]
    TerminationTimeout(Pid),
    #[error(transparent)]
    SignalFailure(#[from] SignalError),
    #[error("pid record error: {0}")]
    PidRecord(#[from] io::Error),
    /// Restart stopped the old instance but could not start a new one.
    #[error("{source}")]
    StartAfterStop {
        stop: StopOutcome,
        source: Box<SupervisorError>,
    },
}

/// Why a record was discarded without signalling anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discarded {
    /// The recorded process no longer exists.
    Stale(Pid),
    /// The record did not hold a PID.
    Corrupt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning(Pid),
    Started {
        pid: Pid,
        log_file: PathBuf,
        discarded: Option<Discarded>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Discarded(Discarded),
    Stopped { pid: Pid, forced: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestartOutcome {
    pub stop: StopOutcome,
    pub start: StartOutcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Running { pid: Pid, since: Option<DateTime<Utc>> },
    Stale { pid: Pid },
    Corrupt,
    NotRunning,
}

/// What the record currently says, cross-checked against the process table.
enum Tracked {
    Nothing,
    Live(Pid),
    Dead(Pid),
    Corrupt,
}

pub struct Supervisor<S, P> {
    store: S,
    table: P,
    request: SpawnRequest,
    policy: StopPolicy,
}

impl Supervisor<PidFile, UnixProcessTable> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PidFile::new(&config.pid_file),
            UnixProcessTable,
            config.spawn_request(),
            config.stop,
        )
    }
}

impl<S: PidStore, P: ProcessTable> Supervisor<S, P> {
    pub fn new(store: S, table: P, request: SpawnRequest, policy: StopPolicy) -> Self {
        Self {
            store,
            table,
            request,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn table(&self) -> &P {
        &self.table
    }

    pub fn request(&self) -> &SpawnRequest {
        &self.request
    }

    fn tracked(&self) -> Result<Tracked, SupervisorError> {
        match self.store.read() {
            Ok(None) => Ok(Tracked::Nothing),
            Ok(Some(pid)) if self.table.is_alive(pid) => Ok(Tracked::Live(pid)),
            Ok(Some(pid)) => Ok(Tracked::Dead(pid)),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                log::warn!("corrupt pid record: {err}");
                Ok(Tracked::Corrupt)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Clear a record whose process is gone or whose content is unusable.
    fn discard(&self, tracked: &Tracked) -> Result<Option<Discarded>, SupervisorError> {
        let discarded = match tracked {
            Tracked::Dead(pid) => Discarded::Stale(*pid),
            Tracked::Corrupt => Discarded::Corrupt,
            Tracked::Nothing | Tracked::Live(_) => return Ok(None),
        };

        self.store.clear()?;
        log::info!("removed pid record ({discarded:?})");
        Ok(Some(discarded))
    }

    /// Launch the service unless the tracked instance is still alive.
    pub fn start(&self) -> Result<StartOutcome, SupervisorError> {
        let tracked = self.tracked()?;

        if let Tracked::Live(pid) = tracked {
            log::info!("already running with pid {pid}");
            return Ok(StartOutcome::AlreadyRunning(pid));
        }

        let discarded = self.discard(&tracked)?;

        log::debug!("spawning '{}' in {:?}", self.request.command_line(), self.request.cwd);
        let pid = self.table.spawn_detached(&self.request)?;

        if let Err(err) = self.store.write(pid) {
            // An unrecorded child could never be stopped by us.
            log::error!("unable to record pid {pid}, killing it: {err}");
            if let Err(kill_err) = self.table.signal_forced(pid) {
                log::error!("{kill_err}");
            }
            return Err(err.into());
        }

        log::info!("started pid {pid}, logging to {:?}", self.request.log_file);
        Ok(StartOutcome::Started {
            pid,
            log_file: self.request.log_file.clone(),
            discarded,
        })
    }

    /// Terminate the tracked instance, escalating to SIGKILL when the
    /// graceful request is not honoured within the poll bound.
    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let pid = match self.tracked()? {
            Tracked::Nothing => return Ok(StopOutcome::NotRunning),
            Tracked::Live(pid) => pid,
            tracked => {
                return Ok(match self.discard(&tracked)? {
                    Some(discarded) => StopOutcome::Discarded(discarded),
                    None => StopOutcome::NotRunning,
                })
            }
        };

        if self.terminate(pid, Termination::Graceful)? {
            self.store.clear()?;
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        for attempt in 1..=self.policy.max_polls {
            self.table.pause(self.policy.poll_interval);
            if !self.table.is_alive(pid) {
                log::debug!("pid {pid} exited after {attempt} poll(s)");
                self.store.clear()?;
                return Ok(StopOutcome::Stopped { pid, forced: false });
            }
        }

        log::warn!("pid {pid} ignored SIGTERM for {} polls, sending SIGKILL", self.policy.max_polls);
        if !self.terminate(pid, Termination::Forced)? {
            self.table.pause(self.policy.kill_grace);
        }

        if self.table.is_alive(pid) {
            log::error!("pid {pid} survived SIGKILL, keeping record");
            return Err(SupervisorError::TerminationTimeout(pid));
        }

        self.store.clear()?;
        Ok(StopOutcome::Stopped { pid, forced: true })
    }

    /// Send one termination request. `true` when the target was already gone.
    fn terminate(&self, pid: Pid, kind: Termination) -> Result<bool, SupervisorError> {
        match self.table.signal(pid, kind)? {
            Delivery::Sent => Ok(false),
            Delivery::NoSuchProcess => Ok(true),
        }
    }

    /// Stop, then start. A failed stop aborts before anything is spawned; a
    /// failed start still reports what the stop did.
    pub fn restart(&self) -> Result<RestartOutcome, SupervisorError> {
        let stop = self.stop()?;
        let start = self.start().map_err(|err| SupervisorError::StartAfterStop {
            stop,
            source: Box::new(err),
        })?;
        Ok(RestartOutcome { stop, start })
    }

    /// Report the record and liveness without changing anything.
    pub fn status(&self) -> Result<Status, SupervisorError> {
        Ok(match self.tracked()? {
            Tracked::Nothing => Status::NotRunning,
            Tracked::Live(pid) => Status::Running {
                pid,
                since: self.store.recorded_at(),
            },
            Tracked::Dead(pid) => Status::Stale { pid },
            Tracked::Corrupt => Status::Corrupt,
        })
    }
}
