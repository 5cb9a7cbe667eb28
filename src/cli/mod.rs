mod status;

pub use status::{status, Format};

use colored::Colorize;
use macros_rs::fmt::crashln;
use std::{
    fs::File,
    io::{self, BufReader},
};

use syncctl::{
    config::Config,
    helpers, journal,
    journal::Journal,
    supervisor::{Discarded, RestartOutcome, StartOutcome, StopOutcome, Supervisor},
    SupervisorError,
};

fn fail(journal: &Journal, action: &str, err: SupervisorError) -> ! {
    journal!(journal, "[supervisor] failed", "action" => action, "error" => &err);
    crashln!("{} {err}", *helpers::FAIL)
}

fn report_discarded(config: &Config, journal: &Journal, discarded: Discarded) {
    let pid_file = config.pid_file.display();

    match discarded {
        Discarded::Stale(pid) => {
            journal!(journal, "[supervisor] removed stale pid record", "pid" => pid);
            println!(
                "{} {} is not running (stale PID {pid}), removed {pid_file}",
                *helpers::WARN,
                config.service
            );
        }
        Discarded::Corrupt => {
            journal!(journal, "[supervisor] removed corrupt pid record", "path" => pid_file);
            println!("{} Removed corrupt PID file {pid_file}", *helpers::WARN);
        }
    }
}

fn report_start(config: &Config, journal: &Journal, command: &str, outcome: StartOutcome) {
    match outcome {
        StartOutcome::AlreadyRunning(pid) => {
            println!(
                "{} {} is already running with PID {pid}",
                *helpers::SUCCESS,
                config.service
            );
        }
        StartOutcome::Started {
            pid,
            log_file,
            discarded,
        } => {
            if let Some(discarded) = discarded {
                report_discarded(config, journal, discarded);
            }

            journal!(journal, "[supervisor] started", "pid" => pid, "command" => command);
            println!("{} Started {} with PID {pid}", *helpers::SUCCESS, config.service);
            println!("{} Logs: {}", *helpers::INFO, log_file.display());
        }
    }
}

fn report_stop(config: &Config, journal: &Journal, outcome: StopOutcome) {
    match outcome {
        StopOutcome::NotRunning => {
            println!(
                "{} {} is not running, nothing to stop",
                *helpers::SUCCESS,
                config.service
            );
        }
        StopOutcome::Discarded(discarded) => report_discarded(config, journal, discarded),
        StopOutcome::Stopped { pid, forced } => {
            journal!(journal, "[supervisor] stopped", "pid" => pid, "forced" => forced);
            if forced {
                println!(
                    "{} PID {pid} ignored SIGTERM and was killed",
                    *helpers::WARN
                );
            }
            println!("{} Stopped {} (PID {pid})", *helpers::SUCCESS, config.service);
        }
    }
}

pub fn start(config: &Config) {
    let journal = Journal::new(&config.supervisor_log);
    let supervisor = Supervisor::from_config(config);
    let command = supervisor.request().command_line();

    println!("{} Starting {} ({command})", *helpers::INFO, config.service);

    match supervisor.start() {
        Ok(outcome) => report_start(config, &journal, &command, outcome),
        Err(err) => fail(&journal, "start", err),
    }
}

pub fn stop(config: &Config) {
    let journal = Journal::new(&config.supervisor_log);
    let supervisor = Supervisor::from_config(config);

    match supervisor.stop() {
        Ok(outcome) => report_stop(config, &journal, outcome),
        Err(err) => fail(&journal, "stop", err),
    }
}

pub fn restart(config: &Config) {
    let journal = Journal::new(&config.supervisor_log);
    let supervisor = Supervisor::from_config(config);
    let command = supervisor.request().command_line();

    println!("{} Restarting {}", *helpers::INFO, config.service);

    match supervisor.restart() {
        Ok(RestartOutcome { stop, start }) => {
            report_stop(config, &journal, stop);
            report_start(config, &journal, &command, start);
        }
        Err(SupervisorError::StartAfterStop { stop, source }) => {
            report_stop(config, &journal, stop);
            fail(&journal, "restart", *source)
        }
        Err(err) => fail(&journal, "restart", err),
    }
}

pub fn logs(config: &Config, lines: usize) {
    let path = config.log_file.display();

    let file = match File::open(&config.log_file) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            println!("{}", format!("[syncctl] No logs found at {path}").bright_black());
            return;
        }
        Err(err) => crashln!("{} Unable to read {path}: {err}", *helpers::FAIL),
    };

    let tail = match helpers::tail_lines(BufReader::new(file), lines) {
        Ok(tail) => tail,
        Err(err) => crashln!("{} Unable to read {path}: {err}", *helpers::FAIL),
    };

    println!(
        "{}",
        format!("Showing last {lines} lines of {path} (change the value with --lines option)").yellow()
    );

    for line in tail {
        println!("{line}");
    }
}
