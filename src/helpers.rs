use chrono::{DateTime, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;
use std::{
    collections::VecDeque,
    io::{self, BufRead},
};

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[syncctl]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[syncctl]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[syncctl]".yellow());
pub static INFO: Lazy<colored::ColoredString> = Lazy::new(|| "[syncctl]".cyan());

// Time constants for duration formatting
const SECONDS_IN_YEAR: i64 = 365 * 24 * 60 * 60;
const SECONDS_IN_DAY: i64 = 24 * 60 * 60;
const SECONDS_IN_HOUR: i64 = 60 * 60;
const SECONDS_IN_MINUTE: i64 = 60;

pub fn format_duration(datetime: DateTime<Utc>) -> String {
    let current_time = Utc::now();
    let duration = current_time.signed_duration_since(datetime);

    match duration.num_seconds() {
        s if s >= SECONDS_IN_YEAR => format!("{}y", s / SECONDS_IN_YEAR),
        s if s >= SECONDS_IN_DAY => format!("{}d", s / SECONDS_IN_DAY),
        s if s >= SECONDS_IN_HOUR => format!("{}h", s / SECONDS_IN_HOUR),
        s if s >= SECONDS_IN_MINUTE => format!("{}m", s / SECONDS_IN_MINUTE),
        s => format!("{}s", s.max(0)),
    }
}

/// The last `count` lines read from `reader`, oldest first. Only `count` lines
/// are held at a time; invalid UTF-8 is replaced.
pub fn tail_lines<R: BufRead>(mut reader: R, count: usize) -> io::Result<Vec<String>> {
    let mut lines = VecDeque::with_capacity(count);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if count == 0 {
            continue;
        }
        if lines.len() == count {
            lines.pop_front();
        }

        let line = String::from_utf8_lossy(&buf);
        lines.push_back(line.trim_end_matches(&['\n', '\r'][..]).to_string());
    }

    Ok(lines.into())
}
