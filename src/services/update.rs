use crate::config::Config;
use crate::domoticz::{DomoticzClient, EVOHOME_HARDWARE_TYPE};
use crate::error::Error;
use crate::models::domoticz::{DeviceRegistry, Idx};
use crate::services::session::Session;
use crate::services::until::resolved_zones;
use crate::timezone::TimeContext;
use crate::zone::{ZoneData, or_empty};
use chrono::NaiveDateTime;
use log::{debug, info};

/// Domoticz client plus the index of the Evohome hardware entry.
pub fn connect_domoticz(cfg: &Config) -> Result<(DomoticzClient, Idx), Error> {
    let domoticz = DomoticzClient::new(cfg.domoticz_host()?);
    let hwid = domoticz
        .hardware_id(EVOHOME_HARDWARE_TYPE, &cfg.hardware_name)?
        .ok_or_else(|| Error::HardwareNotFound(cfg.hardware_name.clone()))?;
    debug!("Domoticz hardware '{}' is idx {}", cfg.hardware_name, hwid);
    Ok((domoticz, hwid))
}

/// Pair zones with their Domoticz device; zones without one are skipped.
pub fn plan<'a>(zones: &'a [ZoneData], registry: &DeviceRegistry) -> Vec<(Idx, &'a ZoneData)> {
    zones
        .iter()
        .filter_map(|z| match registry.get(&z.zone_id) {
            Some(device) => Some((device.idx, z)),
            None => {
                debug!("No Domoticz device for zone {}", z.zone_id);
                None
            }
        })
        .collect()
}

pub fn push_zone(domoticz: &DomoticzClient, idx: Idx, zone: &ZoneData) -> Result<(), Error> {
    domoticz.update_zone_status(
        idx,
        &zone.temperature_str(),
        or_empty(&zone.target),
        or_empty(&zone.setpoint_mode),
        or_empty(&zone.until),
    )?;
    Ok(())
}

/// Push the state of every zone of the session to Domoticz. Returns the number of devices updated.
pub fn run(cfg: &Config, session: &Session, tc: &TimeContext, reference: NaiveDateTime) -> Result<usize, Error> {
    let zones = resolved_zones(&session.system, &session.schedules, tc, reference)?;

    let (domoticz, hwid) = connect_domoticz(cfg)?;
    let registry = domoticz.devices(hwid)?;
    let pushes = plan(&zones, &registry);
    for (idx, zone) in &pushes {
        push_zone(&domoticz, *idx, zone)?;
    }
    info!("Updated {} of {} zone(s) in Domoticz", pushes.len(), zones.len());
    Ok(pushes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domoticz::registry_for;
    use crate::models::domoticz::{Device, Reply};

    #[test]
    fn plans_only_zones_with_devices() {
        let json = std::fs::read_to_string("tests/data/domoticz-devices.json").expect("fixture present");
        let reply: Reply<Device> = serde_json::from_str(&json).unwrap();
        let registry = registry_for(reply.result, Idx(3));

        let zones: Vec<ZoneData> = ["4000001", "4000002", "4000003"]
            .iter()
            .map(|id| ZoneData {
                zone_id: id.to_string(),
                ..Default::default()
            })
            .collect();
        let planned: Vec<(Idx, &str)> = plan(&zones, &registry)
            .into_iter()
            .map(|(idx, z)| (idx, z.zone_id.as_str()))
            .collect();
        assert_eq!(planned, vec![(Idx(21), "4000001"), (Idx(23), "4000003")]);
    }
}
