//! Minimal blocking client for the Domoticz JSON API.
//!
//! Only what the bridge needs: find the Evohome hardware entry, list its devices and push
//! zone readings with the `udevice` command.

use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::client::decode;
use crate::models::domoticz::*;

/// Hardware type of the Evohome script/web API plugin.
pub const EVOHOME_HARDWARE_TYPE: u64 = 40;
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug)]
pub enum DomoticzError {
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    Rejected { command: String, status: String },
}

impl core::fmt::Display for DomoticzError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DomoticzError::Transport(s) => write!(f, "domoticz transport error: {}", s),
            DomoticzError::Http { status, message } => write!(f, "domoticz http {}: {}", status, message),
            DomoticzError::Json(e) => write!(f, "domoticz json error at {}: {}", e.path(), e.inner()),
            DomoticzError::Rejected { command, status } => {
                write!(f, "domoticz rejected {} (status {})", command, status)
            }
        }
    }
}

impl std::error::Error for DomoticzError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DomoticzError::Json(e) => Some(e.inner()),
            _ => None,
        }
    }
}

impl From<ureq::Error> for DomoticzError {
    fn from(value: ureq::Error) -> Self {
        DomoticzError::Transport(value.to_string())
    }
}

pub struct DomoticzClient {
    agent: ureq::Agent,
    host: String,
}

impl DomoticzClient {
    /// `host` is the scheme, host and port, e.g. `http://127.0.0.1:8080`.
    pub fn new(host: String) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build()
            .into();
        DomoticzClient { agent, host }
    }

    fn json_url(&self) -> String {
        format!("{}/json.htm", self.host)
    }

    fn get_reply<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<Reply<T>, DomoticzError> {
        let mut req = self.agent.get(self.json_url());
        for (k, v) in params {
            req = req.query(*k, *v);
        }
        let mut resp = req.call()?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(DomoticzError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        decode(&body).map_err(DomoticzError::Json)
    }

    /// Index of the hardware entry with the given type and name.
    pub fn hardware_id(&self, hardware_type: u64, name: &str) -> Result<Option<Idx>, DomoticzError> {
        let reply: Reply<Hardware> = self.get_reply(&[("type", "hardware")])?;
        Ok(find_hardware(&reply.result, hardware_type, name))
    }

    /// All devices of hardware `hwid`, hidden ones included.
    pub fn devices(&self, hwid: Idx) -> Result<DeviceRegistry, DomoticzError> {
        let reply: Reply<Device> = self.get_reply(&[
            ("type", "devices"),
            ("displayhidden", "1"),
            ("used", "all"),
            ("filter", "all"),
        ])?;
        let registry = registry_for(reply.result, hwid);
        debug!("Domoticz hardware {} has {} device(s)", hwid, registry.len());
        Ok(registry)
    }

    /// Push temperature, setpoint, mode and until of a zone device.
    pub fn update_zone_status(
        &self,
        idx: Idx,
        temperature: &str,
        setpoint: &str,
        mode: &str,
        until: &str,
    ) -> Result<(), DomoticzError> {
        let idx = idx.to_string();
        let svalue = zone_svalue(temperature, setpoint, mode, until);
        debug!("udevice idx={} svalue={}", idx, svalue);
        let reply: Reply<serde_json::Value> = self.get_reply(&[
            ("type", "command"),
            ("param", "udevice"),
            ("idx", idx.as_str()),
            ("nvalue", "0"),
            ("svalue", svalue.as_str()),
        ])?;
        if !reply.is_ok() {
            return Err(DomoticzError::Rejected {
                command: format!("udevice idx={}", idx),
                status: reply.status.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

pub fn find_hardware(hardware: &[Hardware], hardware_type: u64, name: &str) -> Option<Idx> {
    hardware
        .iter()
        .find(|h| h.hardware_type.0 == hardware_type && h.name == name)
        .map(|h| h.idx)
}

pub fn registry_for(devices: Vec<Device>, hwid: Idx) -> DeviceRegistry {
    devices
        .into_iter()
        .filter(|d| d.hardware_id == hwid)
        .map(|d| (d.device_id.clone(), d))
        .collect()
}

/// `svalue` of a zone device: `temperature;setpoint;mode;until`.
pub fn zone_svalue(temperature: &str, setpoint: &str, mode: &str, until: &str) -> String {
    format!("{};{};{};{}", temperature, setpoint, mode, until)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture<T: DeserializeOwned>(path: &str) -> Reply<T> {
        let json = std::fs::read_to_string(path).expect("fixture present");
        serde_json::from_str(&json).expect("parse fixture")
    }

    #[test]
    fn finds_evohome_hardware_by_type_and_name() {
        let reply: Reply<Hardware> = fixture("tests/data/domoticz-hardware.json");
        assert_eq!(find_hardware(&reply.result, EVOHOME_HARDWARE_TYPE, "evohome"), Some(Idx(3)));
        assert_eq!(find_hardware(&reply.result, EVOHOME_HARDWARE_TYPE, "Evohome"), None);
        assert_eq!(find_hardware(&reply.result, 21, "evohome"), None);
    }

    #[test]
    fn registry_keeps_only_own_hardware() {
        let reply: Reply<Device> = fixture("tests/data/domoticz-devices.json");
        let registry = registry_for(reply.result, Idx(3));
        assert_eq!(
            registry.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["3456789", "4000001", "4000003"]
        );
        assert_eq!(registry["4000003"].idx, Idx(23));
    }

    #[test]
    fn svalue_keeps_empty_fields() {
        assert_eq!(
            zone_svalue("20.5", "21", "FollowSchedule", "2024-03-11T06:30:00"),
            "20.5;21;FollowSchedule;2024-03-11T06:30:00"
        );
        assert_eq!(zone_svalue("", "18", "PermanentOverride", ""), ";18;PermanentOverride;");
    }
}
