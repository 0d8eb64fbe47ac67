use crate::client::EvohomeClientError;
use crate::config::ConfigError;
use crate::domoticz::DomoticzError;
use crate::selector::SelectError;
use crate::timezone::TimestampError;

/// Everything that can end a run; reported once by `main`.
#[derive(Debug)]
pub enum Error {
    Usage(String),
    Config(ConfigError),
    Select(SelectError),
    Timestamp(TimestampError),
    Evohome(EvohomeClientError),
    Domoticz(DomoticzError),
    ZoneNotFound(String),
    HardwareNotFound(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Usage(s) => write!(f, "{}", s),
            Error::Config(e) => write!(f, "{}", e),
            Error::Select(e) => write!(f, "{}", e),
            Error::Timestamp(e) => write!(f, "{}", e),
            Error::Evohome(e) => write!(f, "evohome: {}", e),
            Error::Domoticz(e) => write!(f, "{}", e),
            Error::ZoneNotFound(id) => write!(f, "zone {} not found in the selected control system", id),
            Error::HardwareNotFound(name) => write!(f, "no evohome hardware named '{}' in domoticz", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Select(e) => Some(e),
            Error::Timestamp(e) => Some(e),
            Error::Evohome(e) => Some(e),
            Error::Domoticz(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Error::Config(value)
    }
}

impl From<SelectError> for Error {
    fn from(value: SelectError) -> Self {
        Error::Select(value)
    }
}

impl From<TimestampError> for Error {
    fn from(value: TimestampError) -> Self {
        Error::Timestamp(value)
    }
}

impl From<EvohomeClientError> for Error {
    fn from(value: EvohomeClientError) -> Self {
        Error::Evohome(value)
    }
}

impl From<DomoticzError> for Error {
    fn from(value: DomoticzError) -> Self {
        Error::Domoticz(value)
    }
}
