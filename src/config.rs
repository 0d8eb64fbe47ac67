//! Runtime configuration read from a key/value file (`evoconfig` by default).
//!
//! Lines are `key = value`; `#` and `;` start comments; values may be single- or double-quoted.

use crate::selector::{Hint, SelectionHints};
use core::fmt;
use log::warn;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "evoconfig";
pub const CONFIG_FILE_ENV: &str = "EVOCONFIG";
pub const DEFAULT_HARDWARE_NAME: &str = "evohome";
pub const DEFAULT_AUTH_FILE: &str = "/tmp/evo2auth.json";
pub const DEFAULT_SCHEDULE_CACHE: &str = "schedules.json";
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Syntax { path: PathBuf, line: usize, message: String },
    Invalid { key: &'static str, value: String },
    Missing { key: &'static str, path: PathBuf },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "can't read config file {}: {}", path.display(), source),
            ConfigError::Syntax { path, line, message } => write!(f, "{}:{}: {}", path.display(), line, message),
            ConfigError::Invalid { key, value } => write!(f, "invalid value for '{}': {}", key, value),
            ConfigError::Missing { key, path } => write!(f, "'{}' is not set in {}", key, path.display()),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// File the settings came from.
    pub path: PathBuf,
    /// Evohome account.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Domoticz host, with or without scheme.
    pub domoticz_url: Option<String>,
    pub domoticz_port: Option<String>,
    /// Name of the Evohome hardware entry in Domoticz.
    pub hardware_name: String,
    pub hints: SelectionHints,
    /// Where the portal access token is kept between runs.
    pub auth_file: PathBuf,
    pub schedule_cache: PathBuf,
    /// Schedule cache older than this is refetched.
    pub schedule_cache_max_age: Duration,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let pairs = read_pairs(path)?;
        Self::from_pairs(path, pairs)
    }

    pub fn from_pairs(path: &Path, mut pairs: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut take = |key: &str| pairs.remove(key).filter(|v| !v.is_empty());

        let source = path.display().to_string();
        let hints = SelectionHints {
            location: level_hint(take("location"), take("locationId"), "location", "locationId")?,
            gateway: level_hint(take("gateway"), take("gatewayId"), "gateway", "gatewayId")?,
            control_system: level_hint(take("controlsystem"), take("systemId"), "controlsystem", "systemId")?,
            source,
        };

        let schedule_cache_max_age = match take("cachemaxage") {
            Some(v) => Duration::from_secs(v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "cachemaxage",
                value: v.clone(),
            })?),
            None => Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
        };

        let cfg = Config {
            path: path.to_path_buf(),
            username: take("usr"),
            password: take("pw"),
            domoticz_url: take("url"),
            domoticz_port: take("port"),
            hardware_name: take("hwname").unwrap_or_else(|| DEFAULT_HARDWARE_NAME.to_string()),
            hints,
            auth_file: take("authfile")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AUTH_FILE)),
            schedule_cache: take("schedulecache")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEDULE_CACHE)),
            schedule_cache_max_age,
        };

        for key in pairs.keys() {
            warn!("Ignoring unknown setting '{}' in {}", key, path.display());
        }
        Ok(cfg)
    }

    /// Domoticz base url, `http://` prefixed when no scheme is given.
    pub fn domoticz_host(&self) -> Result<String, ConfigError> {
        let url = self.domoticz_url.as_deref().ok_or_else(|| ConfigError::Missing {
            key: "url",
            path: self.path.clone(),
        })?;
        Ok(domoticz_host(url, self.domoticz_port.as_deref()))
    }
}

pub fn domoticz_host(url: &str, port: Option<&str>) -> String {
    let mut host = String::new();
    if !url.starts_with("http") {
        host.push_str("http://");
    }
    host.push_str(url.trim_end_matches('/'));
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        host.push(':');
        host.push_str(port);
    }
    host
}

fn level_hint(
    index: Option<String>,
    id: Option<String>,
    index_key: &'static str,
    id_key: &'static str,
) -> Result<Option<Hint>, ConfigError> {
    match (index, id) {
        (Some(_), Some(id)) => {
            warn!("Both '{}' and '{}' are set; using '{}'", index_key, id_key, id_key);
            Ok(Some(Hint::Id(id)))
        }
        (None, Some(id)) => Ok(Some(Hint::Id(id))),
        (Some(index), None) => index
            .trim()
            .parse::<usize>()
            .map(|i| Some(Hint::Index(i)))
            .map_err(|_| ConfigError::Invalid {
                key: index_key,
                value: index,
            }),
        (None, None) => Ok(None),
    }
}

pub fn read_pairs(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);

    let mut pairs = BTreeMap::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        match parse_assignment(&line) {
            Ok(Some((key, value))) => {
                pairs.insert(key, value);
            }
            Ok(None) => {}
            Err(message) => {
                return Err(ConfigError::Syntax {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message,
                });
            }
        }
    }
    Ok(pairs)
}

fn parse_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Ok(None);
    }

    let mut parts = trimmed.splitn(2, '=');
    let key = parts
        .next()
        .map(|k| k.trim().trim_matches(|c| c == '"' || c == '\''))
        .ok_or_else(|| "missing setting name".to_string())?;
    let value_part = parts.next().ok_or_else(|| "missing '=' in assignment".to_string())?;

    if key.is_empty() {
        return Err("setting name cannot be empty".to_string());
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("setting name contains whitespace: {}", key));
    }

    let value = parse_value(value_part)?;
    Ok(Some((key.to_string(), value)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let quote = match chars.next() {
        None => return Ok(String::new()),
        Some(q @ ('"' | '\'')) => q,
        Some(_) => {
            // passwords may contain '#', so only a comment marker preceded by whitespace counts
            let value = match trimmed.find(" #").or_else(|| trimmed.find(" ;")) {
                Some(pos) => &trimmed[..pos],
                None => trimmed,
            };
            return Ok(value.trim_end().to_string());
        }
    };

    let mut value = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            c if c == quote => {
                let tail = chars.as_str().trim_start();
                return if tail.is_empty() || tail.starts_with(['#', ';']) {
                    Ok(value)
                } else {
                    Err(format!("unexpected characters after closing {} quote", quote))
                };
            }
            // escapes only inside double quotes
            '\\' if quote == '"' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other),
                None => return Err("value ends inside an escape sequence".to_string()),
            },
            c => value.push(c),
        }
    }
    Err(format!("missing closing {} quote", quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_assignments_and_comments() {
        assert_eq!(parse_assignment("# comment").unwrap(), None);
        assert_eq!(parse_assignment("; comment").unwrap(), None);
        assert_eq!(parse_assignment("   ").unwrap(), None);
        assert_eq!(
            parse_assignment("usr = me@example.com").unwrap(),
            Some(("usr".into(), "me@example.com".into()))
        );
        assert_eq!(
            parse_assignment("pw=\"se cr\\\"et\" # quoted").unwrap(),
            Some(("pw".into(), "se cr\"et".into()))
        );
        assert_eq!(
            parse_assignment("pw='p#ss'").unwrap(),
            Some(("pw".into(), "p#ss".into()))
        );
        assert_eq!(parse_assignment("pw=p#ss").unwrap(), Some(("pw".into(), "p#ss".into())));
        assert_eq!(
            parse_assignment("url=192.168.1.2 # local").unwrap(),
            Some(("url".into(), "192.168.1.2".into()))
        );
        assert_eq!(
            parse_assignment("pw='back\\slash' ; literal").unwrap(),
            Some(("pw".into(), "back\\slash".into()))
        );
        assert_eq!(
            parse_assignment("hwname=\"evo\\thome\"").unwrap(),
            Some(("hwname".into(), "evo\thome".into()))
        );
        assert_eq!(parse_assignment("port=8080 ; dz").unwrap(), Some(("port".into(), "8080".into())));
        assert!(parse_assignment("pw='a'b").is_err());
        assert!(parse_assignment("pw=\"a\\").is_err());
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("pw=\"open").is_err());
        assert!(parse_assignment("my key=1").is_err());
    }

    #[test]
    fn builds_hints_from_either_form() {
        let cfg = Config::from_pairs(
            Path::new("evoconfig"),
            pairs(&[("location", "1"), ("gatewayId", "2345678"), ("controlsystem", "")]),
        )
        .unwrap();
        assert_eq!(cfg.hints.location, Some(Hint::Index(1)));
        assert_eq!(cfg.hints.gateway, Some(Hint::Id("2345678".into())));
        assert_eq!(cfg.hints.control_system, None);
        assert_eq!(cfg.hints.source, "evoconfig");
    }

    #[test]
    fn id_form_wins_over_index() {
        let cfg = Config::from_pairs(
            Path::new("evoconfig"),
            pairs(&[("controlsystem", "0"), ("systemId", "3456789")]),
        )
        .unwrap();
        assert_eq!(cfg.hints.control_system, Some(Hint::Id("3456789".into())));
    }

    #[test]
    fn rejects_non_numeric_index() {
        let err = Config::from_pairs(Path::new("evoconfig"), pairs(&[("gateway", "first")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "gateway", .. }));
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_pairs(Path::new("evoconfig"), BTreeMap::new()).unwrap();
        assert_eq!(cfg.hardware_name, DEFAULT_HARDWARE_NAME);
        assert_eq!(cfg.auth_file, PathBuf::from(DEFAULT_AUTH_FILE));
        assert_eq!(cfg.schedule_cache, PathBuf::from(DEFAULT_SCHEDULE_CACHE));
        assert_eq!(cfg.schedule_cache_max_age, Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS));
        assert!(cfg.hints.is_empty());
        assert!(matches!(cfg.domoticz_host(), Err(ConfigError::Missing { key: "url", .. })));
    }

    #[test]
    fn domoticz_host_prefixes_scheme_and_port() {
        assert_eq!(domoticz_host("192.168.1.2", Some("8080")), "http://192.168.1.2:8080");
        assert_eq!(domoticz_host("https://dz.local/", None), "https://dz.local");
        assert_eq!(domoticz_host("dz.local", Some("")), "http://dz.local");
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# evohome").unwrap();
        writeln!(file, "usr = \"me@example.com\"").unwrap();
        writeln!(file, "pw = 'secret'").unwrap();
        writeln!(file, "url = 192.168.1.2").unwrap();
        writeln!(file, "port = 8080").unwrap();
        writeln!(file, "hwname = evo").unwrap();
        writeln!(file, "systemId = 3456789").unwrap();
        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.username.as_deref(), Some("me@example.com"));
        assert_eq!(cfg.password.as_deref(), Some("secret"));
        assert_eq!(cfg.hardware_name, "evo");
        assert_eq!(cfg.domoticz_host().unwrap(), "http://192.168.1.2:8080");
        assert_eq!(cfg.hints.control_system, Some(Hint::Id("3456789".into())));
    }

    #[test]
    fn reports_syntax_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "usr = me").unwrap();
        writeln!(file, "broken line").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 2, .. }));
    }
}
