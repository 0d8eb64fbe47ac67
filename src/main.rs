pub mod models {
    pub mod domoticz;
    pub mod evohome;
}

pub mod client;
pub mod config;
pub mod domoticz;
pub mod error;
pub mod schedule;
pub mod selector;
pub mod timezone;
pub mod zone;
pub mod services {
    pub mod session;
    pub mod settemp;
    pub mod status;
    pub mod until;
    pub mod update;
}

use crate::config::{CONFIG_FILE_ENV, Config, DEFAULT_CONFIG_FILE};
use crate::error::Error;
use crate::services::session::Session;
use crate::services::settemp::SetTempArgs;
use crate::services::until::resolved_zones;
use crate::services::{settemp, status, update};
use crate::timezone::TimeContext;
use chrono::Local;
use log::{debug, error, info};
use std::ffi::OsString;
use std::path::PathBuf;

const USAGE: &str = "\
usage: evohome-domoticz [-c FILE] [-v] <command> [args]

commands:
  status                                   show the zones of the selected system
  update [--reload-cache]                  push all zones to Domoticz
  settemp <zone-id> <mode> <setpoint> [<until>]
                                           set (mode 0: cancel) a zone override

options:
  -c, --conf FILE   configuration file (default: $EVOCONFIG or ./evoconfig)
  -v, --verbose     debug logging
  -h, --help        this text";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Status,
    Update { reload_cache: bool },
    SetTemp(SetTempArgs),
    Help,
}

#[derive(Debug, Clone, PartialEq)]
struct Cli {
    conf: Option<PathBuf>,
    verbose: bool,
    command: Command,
}

fn parse_cli(args: impl IntoIterator<Item = OsString>) -> Result<Cli, Error> {
    let mut args = args.into_iter();

    let mut conf: Option<PathBuf> = None;
    let mut verbose = false;
    let mut help = false;
    let mut positional: Vec<String> = Vec::new();

    while let Some(arg) = args.next() {
        let Some(s) = arg.to_str() else {
            return Err(Error::Usage("argument contains invalid UTF-8".to_string()));
        };
        match s {
            "-c" | "--conf" => {
                if conf.is_some() {
                    return Err(Error::Usage("`--conf` provided more than once".to_string()));
                }
                let value = args
                    .next()
                    .ok_or_else(|| Error::Usage("`--conf` requires a path argument".to_string()))?;
                conf = Some(PathBuf::from(value));
            }
            s if s.starts_with("--conf=") => {
                if conf.is_some() {
                    return Err(Error::Usage("`--conf` provided more than once".to_string()));
                }
                let path_str = &s["--conf=".len()..];
                if path_str.is_empty() {
                    return Err(Error::Usage("`--conf` requires a path argument".to_string()));
                }
                conf = Some(PathBuf::from(path_str));
            }
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => help = true,
            "--reload-cache" => positional.push(s.to_string()),
            s if s.starts_with('-') && s.len() > 1 && positional.is_empty() => {
                return Err(Error::Usage(format!("unrecognised option: {}", s)));
            }
            other => positional.push(other.to_string()),
        }
    }

    let command = if help {
        Command::Help
    } else {
        match positional.split_first() {
            None => Command::Help,
            Some((cmd, rest)) => match (cmd.as_str(), rest) {
                ("status", []) => Command::Status,
                ("update", []) => Command::Update { reload_cache: false },
                ("update", [flag]) if flag == "--reload-cache" => Command::Update { reload_cache: true },
                ("settemp", rest) => Command::SetTemp(SetTempArgs::parse(rest)?),
                ("status" | "update", [extra, ..]) => {
                    return Err(Error::Usage(format!("{}: unexpected argument '{}'", cmd, extra)));
                }
                (other, _) => return Err(Error::Usage(format!("unknown command: {}", other))),
            },
        }
    };

    Ok(Cli { conf, verbose, command })
}

fn config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn run(cli: Cli) -> Result<(), Error> {
    let reload_cache = match &cli.command {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::Update { reload_cache } => *reload_cache,
        _ => false,
    };

    let path = config_path(cli.conf);
    let cfg = Config::from_file(&path)?;
    info!("Configuration loaded from {}", path.display());

    // one offset for the whole run
    let now = Local::now();
    let tc = TimeContext::capture(&now);
    let reference = now.naive_local();
    debug!("Local time {} (UTC offset {}s)", reference, tc.offset_seconds());

    match &cli.command {
        Command::Status => {
            let session = Session::open(&cfg, reload_cache)?;
            let zones = resolved_zones(&session.system, &session.schedules, &tc, reference)?;
            print!("{}", status::render(session.location_name(), &session.system, &zones));
        }
        Command::Update { .. } => {
            let session = Session::open(&cfg, reload_cache)?;
            update::run(&cfg, &session, &tc, reference)?;
        }
        Command::SetTemp(args) => settemp::run(&cfg, args, &tc, reference)?,
        Command::Help => {}
    }
    Ok(())
}

fn main() {
    let cli = match parse_cli(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}\n\n{}", err, USAGE);
            std::process::exit(1);
        }
    };

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();

    info!(
        "evohome-domoticz {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, Error> {
        parse_cli(args.iter().map(OsString::from))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse(&["status"]).unwrap().command, Command::Status);
        assert_eq!(
            parse(&["update", "--reload-cache"]).unwrap().command,
            Command::Update { reload_cache: true }
        );
        let cli = parse(&["-v", "--conf=/etc/evo", "settemp", "4000001", "0", "0"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.conf, Some(PathBuf::from("/etc/evo")));
        assert!(matches!(cli.command, Command::SetTemp(ref a) if a.is_cancel()));
    }

    #[test]
    fn no_command_or_help_shows_usage() {
        assert_eq!(parse(&[]).unwrap().command, Command::Help);
        assert_eq!(parse(&["status", "-h"]).unwrap().command, Command::Help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(parse(&["-c"]), Err(Error::Usage(_))));
        assert!(matches!(parse(&["-c", "a", "-c", "b", "status"]), Err(Error::Usage(_))));
        assert!(matches!(parse(&["--frobnicate", "status"]), Err(Error::Usage(_))));
        assert!(matches!(parse(&["reboot"]), Err(Error::Usage(_))));
        assert!(matches!(parse(&["status", "now"]), Err(Error::Usage(_))));
    }

    #[test]
    fn negative_setpoint_is_positional() {
        let cli = parse(&["settemp", "4000001", "1", "-5"]).unwrap();
        assert!(matches!(cli.command, Command::SetTemp(ref a) if a.setpoint == -5.0));
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(config_path(Some(PathBuf::from("x"))), PathBuf::from("x"));
    }
}
