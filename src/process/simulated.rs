//! In-memory process table.
//!
//! Processes react to termination requests according to a scripted
//! [`Reaction`], and time only advances when the supervisor pauses, so the
//! full escalation path runs without real processes or real sleeps.

use super::{Delivery, ProcessTable, SignalError, SpawnError, SpawnRequest, Termination};
use crate::pid::Pid;

use std::{cell::RefCell, collections::BTreeMap, io, time::Duration};

/// How a simulated process responds to one kind of termination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// Still observed alive by this many further probes, then gone.
    ExitAfter(usize),
    Ignore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimProcess {
    pub on_graceful: Reaction,
    pub on_forced: Reaction,
    remaining: Option<usize>,
}

impl SimProcess {
    /// Exits as soon as it is asked to.
    pub fn cooperative() -> Self {
        Self::new(Reaction::ExitAfter(0), Reaction::ExitAfter(0))
    }

    /// Needs `probes` liveness checks after SIGTERM before it is gone.
    pub fn slow(probes: usize) -> Self {
        Self::new(Reaction::ExitAfter(probes), Reaction::ExitAfter(0))
    }

    /// Ignores SIGTERM, dies on SIGKILL.
    pub fn stubborn() -> Self {
        Self::new(Reaction::Ignore, Reaction::ExitAfter(0))
    }

    /// Survives everything, e.g. stuck in uninterruptible sleep.
    pub fn unkillable() -> Self {
        Self::new(Reaction::Ignore, Reaction::Ignore)
    }

    pub fn new(on_graceful: Reaction, on_forced: Reaction) -> Self {
        Self {
            on_graceful,
            on_forced,
            remaining: None,
        }
    }
}

/// Observable side effect, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Signal(Pid, Termination),
    Spawn(Pid),
}

#[derive(Debug)]
struct State {
    processes: BTreeMap<Pid, SimProcess>,
    next_pid: i32,
    next_spawn: SimProcess,
    fail_spawns: bool,
    calls: Vec<Call>,
    spawned: Vec<SpawnRequest>,
    probes: usize,
    paused: Duration,
}

#[derive(Debug)]
pub struct SimulatedTable {
    state: RefCell<State>,
}

impl Default for SimulatedTable {
    fn default() -> Self {
        Self {
            state: RefCell::new(State {
                processes: BTreeMap::new(),
                next_pid: 1000,
                next_spawn: SimProcess::cooperative(),
                fail_spawns: false,
                calls: Vec::new(),
                spawned: Vec::new(),
                probes: 0,
                paused: Duration::ZERO,
            }),
        }
    }
}

impl SimulatedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running process.
    pub fn with_process(self, pid: i32, process: SimProcess) -> Self {
        if let Some(pid) = Pid::new(pid) {
            self.state.borrow_mut().processes.insert(pid, process);
        }
        self
    }

    /// Behaviour of processes started by `spawn_detached`.
    pub fn spawning(self, process: SimProcess) -> Self {
        self.state.borrow_mut().next_spawn = process;
        self
    }

    /// Make every `spawn_detached` fail as if the launcher were missing.
    pub fn failing_spawns(self) -> Self {
        self.state.borrow_mut().fail_spawns = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn signals(&self) -> Vec<(Pid, Termination)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Signal(pid, kind) => Some((pid, kind)),
                Call::Spawn(_) => None,
            })
            .collect()
    }

    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.state.borrow().spawned.clone()
    }

    /// Number of liveness probes answered so far.
    pub fn probes(&self) -> usize {
        self.state.borrow().probes
    }

    /// Total time the caller asked to wait.
    pub fn paused(&self) -> Duration {
        self.state.borrow().paused
    }

    /// Whether `pid` is running, without counting as a probe.
    pub fn running(&self, pid: Pid) -> bool {
        self.state.borrow().processes.contains_key(&pid)
    }

    fn deliver(&self, pid: Pid, kind: Termination) -> Delivery {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(process) = state.processes.get_mut(&pid) else {
            return Delivery::NoSuchProcess;
        };

        let reaction = match kind {
            Termination::Graceful => process.on_graceful,
            Termination::Forced => process.on_forced,
        };

        if let Reaction::ExitAfter(probes) = reaction {
            process.remaining = Some(process.remaining.map_or(probes, |left| left.min(probes)));
        }

        state.calls.push(Call::Signal(pid, kind));
        Delivery::Sent
    }
}

impl ProcessTable for SimulatedTable {
    fn is_alive(&self, pid: Pid) -> bool {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.probes += 1;

        let Some(process) = state.processes.get_mut(&pid) else {
            return false;
        };

        let remaining = process.remaining;
        match remaining {
            Some(0) => {
                state.processes.remove(&pid);
                false
            }
            Some(left) => {
                process.remaining = Some(left - 1);
                true
            }
            None => true,
        }
    }

    fn signal_graceful(&self, pid: Pid) -> Result<Delivery, SignalError> {
        Ok(self.deliver(pid, Termination::Graceful))
    }

    fn signal_forced(&self, pid: Pid) -> Result<Delivery, SignalError> {
        Ok(self.deliver(pid, Termination::Forced))
    }

    fn spawn_detached(&self, request: &SpawnRequest) -> Result<Pid, SpawnError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        if state.fail_spawns {
            return Err(SpawnError::Launch {
                program: request.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        while state.processes.keys().any(|pid| pid.get() == state.next_pid) {
            state.next_pid += 1;
        }

        let pid = Pid::new(state.next_pid).ok_or_else(|| SpawnError::Launch {
            program: request.program.clone(),
            source: io::Error::new(io::ErrorKind::Other, "pid space exhausted"),
        })?;

        state.next_pid += 1;
        let process = state.next_spawn;
        state.processes.insert(pid, process);
        state.spawned.push(request.clone());
        state.calls.push(Call::Spawn(pid));

        Ok(pid)
    }

    fn pause(&self, duration: Duration) {
        self.state.borrow_mut().paused += duration;
    }
}
