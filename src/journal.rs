//! Append-only record of supervisor actions, kept next to the service log.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Journal {
    path: PathBuf,
}

/// Formats arguments into a string for logging
pub fn format_args(args: &[(String, String)]) -> String {
    args.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<String>>()
        .join(", ")
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Journal { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, message: &str, args: &[(String, String)]) {
        let msg = match args.is_empty() {
            true => message.to_string(),
            false => format!("{message} ({})", format_args(args)),
        };

        log::info!("{msg}");

        // The journal is best effort; a missing log directory only means
        // nothing was ever started here.
        let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) else {
            return;
        };

        let _ = writeln!(
            &mut file,
            "[{}] {msg}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
        );
    }
}

#[macro_export]
macro_rules! journal {
    ($journal:expr, $msg:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut args: Vec<(String, String)> = Vec::new();
        $(args.push(($key.to_string(), format!("{}", $value)));)*
        $journal.write($msg, &args)
    }};
}
