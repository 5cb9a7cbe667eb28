use colored::{ColoredString, Colorize};
use macros_rs::fmt::{crashln, string};
use serde_json::json;

use syncctl::{
    config::Config,
    helpers,
    supervisor::{Status, Supervisor},
};

use tabled::{
    settings::{
        object::Columns,
        style::{BorderColor, Style},
        themes::Colorization,
        Color, Rotate,
    },
    Table, Tabled,
};

/// Output of `syncctl status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Default,
    Json,
    Raw,
}

#[derive(Clone, Debug, Tabled)]
struct Info {
    name: String,
    status: ColoredString,
    pid: String,
    uptime: String,
    #[tabled(rename = "pid file")]
    pid_file: String,
    #[tabled(rename = "log file")]
    log_file: String,
    command: String,
}

fn describe(status: &Status) -> (ColoredString, String, String) {
    match status {
        Status::Running { pid, since } => (
            "online".green().bold(),
            pid.to_string(),
            since.map(helpers::format_duration).unwrap_or_else(|| string!("none")),
        ),
        Status::Stale { pid } => ("stale".yellow().bold(), pid.to_string(), string!("none")),
        Status::Corrupt => ("corrupt".yellow().bold(), string!("n/a"), string!("none")),
        Status::NotRunning => ("stopped".red().bold(), string!("n/a"), string!("none")),
    }
}

pub fn status(config: &Config, format: Format) {
    let supervisor = Supervisor::from_config(config);
    let command = supervisor.request().command_line();

    let status = match supervisor.status() {
        Ok(status) => status,
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    };

    let (state, pid, uptime) = describe(&status);
    let data = vec![Info {
        name: config.service.clone(),
        status: state,
        pid,
        uptime,
        pid_file: format!("{}  ", config.pid_file.display()),
        log_file: config.log_file.display().to_string(),
        command: command.clone(),
    }];

    match format {
        Format::Raw => println!("{:?}", data[0]),
        Format::Json => {
            let value = json!({
                "name": &config.service,
                "state": status,
                "pid_file": config.pid_file,
                "log_file": config.log_file,
                "command": command,
            });
            println!("{value}");
        }
        Format::Default => {
            let table = Table::new(data)
                .with(Rotate::Left)
                .with(Style::modern().remove_horizontals())
                .with(Colorization::exact([Color::FG_CYAN], Columns::first()))
                .with(BorderColor::filled(Color::FG_BRIGHT_BLACK))
                .to_string();

            println!(
                "{}\n{table}\n",
                format!("{} information", config.service).on_bright_white().black()
            );

            match status {
                Status::Running { .. } => println!(
                    " {}",
                    format!("Use `syncctl restart` to restart {}", config.service).white()
                ),
                Status::Stale { .. } | Status::Corrupt => println!(
                    " {}",
                    format!("Use `syncctl stop` to clear {}", config.pid_file.display()).white()
                ),
                Status::NotRunning => println!(
                    " {}",
                    format!("Use `syncctl start` to start {}", config.service).white()
                ),
            }
        }
    }
}
