//! Persistence of the tracked process id.
//!
//! The record is a file holding a single decimal PID. It is never proof that
//! the process is alive; callers cross-check it against the process table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    cell::{Cell, RefCell},
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

/// A positive operating-system process id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Pid(i32);

impl Pid {
    /// PID 0 and negative values address process groups, never a single process.
    pub fn new(raw: i32) -> Option<Self> {
        (raw > 0).then_some(Pid(raw))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.parse::<i32>().map_err(|err| format!("invalid pid '{trimmed}': {err}"))?;
        Pid::new(raw).ok_or_else(|| format!("invalid pid '{trimmed}': must be positive"))
    }
}

/// Read, persist and clear the tracked PID.
pub trait PidStore {
    /// `Ok(None)` when the record is absent or empty. Content that is not a
    /// valid PID is reported as [`io::ErrorKind::InvalidData`].
    fn read(&self) -> io::Result<Option<Pid>>;

    /// Replace the record with `pid`.
    fn write(&self, pid: Pid) -> io::Result<()>;

    /// Remove the record. Clearing an absent record succeeds.
    fn clear(&self) -> io::Result<()>;

    /// When the current record was written, if the store knows.
    fn recorded_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl<S: PidStore + ?Sized> PidStore for &S {
    fn read(&self) -> io::Result<Option<Pid>> {
        (**self).read()
    }
    fn write(&self, pid: Pid) -> io::Result<()> {
        (**self).write(pid)
    }
    fn clear(&self) -> io::Result<()> {
        (**self).clear()
    }
    fn recorded_at(&self) -> Option<DateTime<Utc>> {
        (**self).recorded_at()
    }
}

fn parse_record(contents: &str) -> io::Result<Option<Pid>> {
    if contents.trim().is_empty() {
        return Ok(None);
    }

    contents
        .parse::<Pid>()
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// PID record kept in a file on disk.
#[derive(Clone, Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PidStore for PidFile {
    fn read(&self) -> io::Result<Option<Pid>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_record(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, pid: Pid) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string())
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    fn recorded_at(&self) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(modified.into())
    }
}

/// In-memory record for exercising the supervisor without touching disk.
#[derive(Debug, Default)]
pub struct MemoryPidStore {
    contents: RefCell<Option<String>>,
    writes: Cell<usize>,
    fail_writes: Cell<bool>,
}

impl MemoryPidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracking(pid: i32) -> Self {
        Self::with_contents(pid.to_string())
    }

    /// Seed the record with arbitrary raw content, valid or not.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let store = Self::default();
        store.contents.replace(Some(contents.into()));
        store
    }

    /// Make every following `write` fail.
    pub fn fail_writes(&self) {
        self.fail_writes.set(true)
    }

    /// Raw record content, `None` if the record does not exist.
    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl PidStore for MemoryPidStore {
    fn read(&self) -> io::Result<Option<Pid>> {
        match self.contents.borrow().as_deref() {
            Some(contents) => parse_record(contents),
            None => Ok(None),
        }
    }

    fn write(&self, pid: Pid) -> io::Result<()> {
        if self.fail_writes.get() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "pid record is read-only"));
        }
        self.writes.set(self.writes.get() + 1);
        self.contents.replace(Some(pid.to_string()));
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.contents.replace(None);
        Ok(())
    }
}
