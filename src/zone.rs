//! Flat per-zone record used for display and for pushing updates to Domoticz.

use crate::models::evohome::{HotWater, Zone, ZoneStatus, setpoint_modes};

/// Best-effort zone state; every field the portal did not report is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneData {
    pub zone_id: String,
    pub name: Option<String>,
    pub temperature: Option<f64>,
    pub setpoint_mode: Option<String>,
    /// Temperature for heating zones; `On`/`Off` for hot water.
    pub target: Option<String>,
    pub until: Option<String>,
}

impl ZoneData {
    /// Extract the display fields from a zone status record.
    ///
    /// `until` is only carried for temporary overrides.
    pub fn project(status: &ZoneStatus) -> Self {
        let setpoint = status.heat_setpoint_status.as_ref();
        let setpoint_mode = setpoint.and_then(|s| s.setpoint_mode.clone());
        let until = if setpoint_mode.as_deref() == Some(setpoint_modes::TEMPORARY_OVERRIDE) {
            setpoint.and_then(|s| s.until.clone())
        } else {
            None
        };
        ZoneData {
            zone_id: status.zone_id.clone(),
            name: status.name.clone(),
            temperature: status.temperature_status.as_ref().and_then(|t| t.temperature),
            setpoint_mode,
            target: setpoint.and_then(|s| s.target_temperature).map(|t| t.to_string()),
            until,
        }
    }

    /// Projection of a zone from the installation tree, whether or not status was merged in.
    pub fn for_zone(zone: &Zone) -> Self {
        match zone.status.as_ref() {
            Some(status) => {
                let mut data = ZoneData::project(status);
                if data.name.is_none() {
                    data.name = zone.name.clone();
                }
                data
            }
            None => ZoneData {
                zone_id: zone.zone_id.clone(),
                name: zone.name.clone(),
                ..Default::default()
            },
        }
    }

    pub fn for_hot_water(dhw: &HotWater) -> Self {
        let status = dhw.status.as_ref();
        let state = status.and_then(|s| s.state_status.as_ref());
        let setpoint_mode = state.and_then(|s| s.mode.clone());
        let until = if setpoint_mode.as_deref() == Some(setpoint_modes::TEMPORARY_OVERRIDE) {
            state.and_then(|s| s.until.clone())
        } else {
            None
        };
        ZoneData {
            zone_id: dhw.dhw_id.clone(),
            name: Some("Hot Water".to_string()),
            temperature: status
                .and_then(|s| s.temperature_status.as_ref())
                .and_then(|t| t.temperature),
            setpoint_mode,
            target: state.and_then(|s| s.state.clone()),
            until,
        }
    }

    pub fn temperature_str(&self) -> String {
        self.temperature.map(|t| t.to_string()).unwrap_or_default()
    }
}

/// Render an absent value as the empty string.
pub fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}
