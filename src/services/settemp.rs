//! `settemp`: set or cancel a zone override, then correct the Domoticz device.
//!
//! Domoticz calls this when a zone setpoint is changed from its UI. It already shows the new
//! setpoint, but not the end of a temporary override, nor the scheduled state after a cancel.
//!
//! Setting an override is addressed by zone id alone and needs no control system selection;
//! only a cancel loads the installation, for the schedule the zone returns to.

use crate::config::Config;
use crate::error::Error;
use crate::models::domoticz::Device;
use crate::models::evohome::setpoint_modes;
use crate::schedule::{self, ScheduleSet};
use crate::services::session::{self, Session};
use crate::services::update::{connect_domoticz, push_zone};
use crate::timezone::{TimeContext, TimestampError};
use crate::zone::ZoneData;
use chrono::NaiveDateTime;
use log::{info, warn};

/// Mode argument that returns the zone to its schedule.
pub const CANCEL_MODE: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub struct SetTempArgs {
    pub zone_id: String,
    pub mode: String,
    pub setpoint: f64,
    /// Local end time of a temporary override.
    pub until: Option<String>,
}

impl SetTempArgs {
    pub fn parse(args: &[String]) -> Result<Self, Error> {
        let [zone_id, mode, setpoint, rest @ ..] = args else {
            return Err(Error::Usage(
                "settemp needs <zone-id> <mode> <setpoint> [<until>]".to_string(),
            ));
        };
        if rest.len() > 1 {
            return Err(Error::Usage(format!("settemp: unexpected argument '{}'", rest[1])));
        }
        let setpoint = setpoint
            .parse::<f64>()
            .map_err(|_| Error::Usage(format!("settemp: setpoint '{}' is not a number", setpoint)))?;
        Ok(SetTempArgs {
            zone_id: zone_id.clone(),
            mode: mode.clone(),
            setpoint,
            until: rest.first().filter(|u| !u.is_empty()).cloned(),
        })
    }

    pub fn is_cancel(&self) -> bool {
        self.mode == CANCEL_MODE
    }
}

/// Zone state after a cancel: the schedule's setpoint in force, until its next switchpoint.
pub fn scheduled_state(
    zone: &ZoneData,
    schedules: &ScheduleSet,
    tc: &TimeContext,
    reference: NaiveDateTime,
) -> Result<ZoneData, Error> {
    let until = schedule::next_switchpoint(schedules, &zone.zone_id, reference)
        .map(|ts| tc.utc_to_local(&ts.to_string()))
        .transpose()?;
    Ok(ZoneData {
        setpoint_mode: Some(setpoint_modes::FOLLOW_SCHEDULE.to_string()),
        target: schedule::current_setpoint(schedules, &zone.zone_id, reference),
        until,
        ..zone.clone()
    })
}

/// End of an override as `(UTC for the portal, local for Domoticz)`.
///
/// Local input is shifted to UTC; input already marked `Z` goes to the portal as is.
pub fn override_until(tc: &TimeContext, until: &str) -> Result<(String, String), TimestampError> {
    let utc = tc.local_to_utc(until)?;
    let local = tc.utc_to_local(&utc)?;
    Ok((utc, local))
}

/// Device state after a temporary override ending at local `until`.
pub fn override_state(device: &Device, setpoint: f64, until: String) -> ZoneData {
    ZoneData {
        zone_id: device.device_id.clone(),
        name: device.name.clone(),
        temperature: device.temp,
        setpoint_mode: Some(setpoint_modes::TEMPORARY_OVERRIDE.to_string()),
        target: Some(setpoint.to_string()),
        until: Some(until),
    }
}

pub fn run(cfg: &Config, args: &SetTempArgs, tc: &TimeContext, reference: NaiveDateTime) -> Result<(), Error> {
    if args.is_cancel() {
        cancel(cfg, args, tc, reference)
    } else {
        set(cfg, args, tc)
    }
}

fn set(cfg: &Config, args: &SetTempArgs, tc: &TimeContext) -> Result<(), Error> {
    let until = args.until.as_deref().map(|u| override_until(tc, u)).transpose()?;

    let client = session::connect(cfg)?;
    client.set_temperature(&args.zone_id, args.setpoint, until.as_ref().map(|(utc, _)| utc.as_str()))?;
    info!(
        "Zone {} set to {} until {}",
        args.zone_id,
        args.setpoint,
        until.as_ref().map(|(_, local)| local.as_str()).unwrap_or("further notice")
    );

    let Some((_, local)) = until else {
        return Ok(());
    };
    let (domoticz, hwid) = connect_domoticz(cfg)?;
    match domoticz.devices(hwid)?.get(&args.zone_id) {
        Some(device) => push_zone(&domoticz, device.idx, &override_state(device, args.setpoint, local)),
        None => {
            warn!("No Domoticz device for zone {}", args.zone_id);
            Ok(())
        }
    }
}

fn cancel(cfg: &Config, args: &SetTempArgs, tc: &TimeContext, reference: NaiveDateTime) -> Result<(), Error> {
    let session = Session::open(cfg, false)?;
    let zone = session
        .system
        .zone_by_id(&args.zone_id)
        .map(ZoneData::for_zone)
        .ok_or_else(|| Error::ZoneNotFound(args.zone_id.clone()))?;

    session.client.cancel_temperature_override(&zone.zone_id)?;
    info!("Zone {} follows its schedule again", zone.zone_id);
    let scheduled = scheduled_state(&zone, &session.schedules, tc, reference)?;

    let (domoticz, hwid) = connect_domoticz(cfg)?;
    match domoticz.devices(hwid)?.get(&zone.zone_id) {
        Some(device) => push_zone(&domoticz, device.idx, &scheduled),
        None => {
            warn!("No Domoticz device for zone {}", zone.zone_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domoticz::{Idx, Reply};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn parses_arguments() {
        let parsed = SetTempArgs::parse(&args(&["4000001", "TemporaryOverride", "21.5", "2024-03-11T22:00:00"])).unwrap();
        assert_eq!(parsed.zone_id, "4000001");
        assert_eq!(parsed.setpoint, 21.5);
        assert_eq!(parsed.until.as_deref(), Some("2024-03-11T22:00:00"));
        assert!(!parsed.is_cancel());

        let parsed = SetTempArgs::parse(&args(&["4000001", "0", "0"])).unwrap();
        assert!(parsed.is_cancel());
        assert_eq!(parsed.until, None);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(SetTempArgs::parse(&args(&["4000001", "1"])), Err(Error::Usage(_))));
        assert!(matches!(
            SetTempArgs::parse(&args(&["4000001", "1", "warm"])),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            SetTempArgs::parse(&args(&["4000001", "1", "20", "2024-03-11T22:00:00", "x"])),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn cancel_restores_scheduled_state() {
        let json = std::fs::read_to_string("tests/data/zone-schedule.json").expect("fixture present");
        let mut schedules = ScheduleSet::new();
        schedules.insert("4000001".into(), serde_json::from_str(&json).unwrap());
        let zone = ZoneData {
            zone_id: "4000001".into(),
            temperature: Some(20.5),
            setpoint_mode: Some("PermanentOverride".into()),
            target: Some("25".into()),
            ..Default::default()
        };
        let tc = TimeContext::from_offset_seconds(7200);
        let state = scheduled_state(&zone, &schedules, &tc, at("2024-03-11T09:00:00")).unwrap();
        assert_eq!(state.setpoint_mode.as_deref(), Some("FollowSchedule"));
        assert_eq!(state.target.as_deref(), Some("16"));
        assert_eq!(state.until.as_deref(), Some("2024-03-11T17:00:00"));
        assert_eq!(state.temperature, Some(20.5));
    }

    #[test]
    fn override_until_from_local_and_utc_input() {
        let tc = TimeContext::from_offset_seconds(3600);
        assert_eq!(
            override_until(&tc, "2024-03-11T22:00:00").unwrap(),
            ("2024-03-11T21:00:00Z".to_string(), "2024-03-11T22:00:00".to_string())
        );
        assert_eq!(
            override_until(&tc, "2024-03-11T22:00:00Z").unwrap(),
            ("2024-03-11T22:00:00Z".to_string(), "2024-03-11T23:00:00".to_string())
        );
        assert!(override_until(&tc, "2024-03-11 22:00").is_err());
    }

    #[test]
    fn override_state_uses_device_reading() {
        let json = std::fs::read_to_string("tests/data/domoticz-devices.json").expect("fixture present");
        let reply: Reply<Device> = serde_json::from_str(&json).unwrap();
        let bath = reply.result.iter().find(|d| d.device_id == "4000003").unwrap();

        let tc = TimeContext::from_offset_seconds(3600);
        let (_, local) = override_until(&tc, "2024-03-11T22:00:00Z").unwrap();
        let state = override_state(bath, 21.5, local);
        assert_eq!(bath.idx, Idx(23));
        assert_eq!(state.zone_id, "4000003");
        assert_eq!(state.temperature, Some(22.5));
        assert_eq!(state.target.as_deref(), Some("21.5"));
        assert_eq!(state.until.as_deref(), Some("2024-03-11T23:00:00"));
        assert_eq!(state.setpoint_mode.as_deref(), Some("TemporaryOverride"));
    }
}
