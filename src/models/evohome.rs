//! Models for the Evohome v2 (EMEA) web API.
//!
//! Notes
//! - Installation tree: location → gateways → temperature control systems → zones (+ optional DHW).
//! - Status replies mirror the tree and are merged into it once, right after the system is selected.
//! - Anything the portal may leave out is an `Option`; absence is data, not an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =====================
// Account
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

// =====================
// Installation tree
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Installation {
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub location_info: LocationInfo,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub location_id: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub time_zone: Option<TimeZoneInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeZoneInfo {
    pub time_zone_id: Option<String>,
    pub display_name: Option<String>,
    pub offset_minutes: Option<i32>,
    pub current_offset_minutes: Option<i32>,
    pub supports_daylight_saving: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub gateway_info: GatewayInfo,
    #[serde(default, rename = "temperatureControlSystems")]
    pub control_systems: Vec<ControlSystem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub gateway_id: String,
    pub mac: Option<String>,
    #[serde(rename = "isWiFi")]
    pub is_wifi: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ControlSystem {
    pub system_id: String,
    pub model_type: Option<String>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    pub dhw: Option<HotWater>,
    #[serde(default)]
    pub allowed_system_modes: Vec<Value>,
    #[serde(skip)]
    pub status: Option<SystemModeStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub zone_id: String,
    pub name: Option<String>,
    pub model_type: Option<String>,
    pub zone_type: Option<String>,
    #[serde(skip)]
    pub status: Option<ZoneStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HotWater {
    pub dhw_id: String,
    #[serde(skip)]
    pub status: Option<HotWaterStatus>,
}

// =====================
// Status
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatus {
    pub location_id: String,
    #[serde(default)]
    pub gateways: Vec<GatewayStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub gateway_id: String,
    #[serde(default, rename = "temperatureControlSystems")]
    pub control_systems: Vec<SystemStatus>,
    #[serde(default)]
    pub active_faults: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub system_id: String,
    #[serde(default)]
    pub zones: Vec<ZoneStatus>,
    pub dhw: Option<HotWaterStatus>,
    pub system_mode_status: Option<SystemModeStatus>,
    #[serde(default)]
    pub active_faults: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemModeStatus {
    pub mode: Option<String>,
    pub is_permanent: Option<bool>,
    pub time_until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatus {
    pub zone_id: String,
    pub name: Option<String>,
    pub temperature_status: Option<TemperatureStatus>,
    pub heat_setpoint_status: Option<HeatSetpointStatus>,
    #[serde(default)]
    pub active_faults: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureStatus {
    pub temperature: Option<f64>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HeatSetpointStatus {
    pub target_temperature: Option<f64>,
    pub setpoint_mode: Option<String>,
    pub until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HotWaterStatus {
    pub dhw_id: String,
    pub temperature_status: Option<TemperatureStatus>,
    pub state_status: Option<StateStatus>,
    #[serde(default)]
    pub active_faults: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateStatus {
    pub state: Option<String>,
    pub mode: Option<String>,
    pub until: Option<String>,
}

// =====================
// Requests
// =====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeatSetpointRequest {
    pub setpoint_mode: &'static str,
    pub heat_setpoint_value: f64,
    pub time_until: Option<String>,
}

pub mod setpoint_modes {
    pub const FOLLOW_SCHEDULE: &str = "FollowSchedule";
    pub const PERMANENT_OVERRIDE: &str = "PermanentOverride";
    pub const TEMPORARY_OVERRIDE: &str = "TemporaryOverride";
}

// =====================
// Tree navigation
// =====================

impl Location {
    pub fn location_id(&self) -> &str {
        &self.location_info.location_id
    }
}

impl Gateway {
    pub fn gateway_id(&self) -> &str {
        &self.gateway_info.gateway_id
    }
}

impl ControlSystem {
    pub fn zone_by_id(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    /// Ids that have a schedule: every zone, then the hot water.
    pub fn schedule_ids(&self) -> impl Iterator<Item = &str> {
        self.zones
            .iter()
            .map(|z| z.zone_id.as_str())
            .chain(self.dhw.iter().map(|d| d.dhw_id.as_str()))
    }
}

impl Installation {
    pub fn control_system_count(&self) -> usize {
        self.locations
            .iter()
            .flat_map(|l| l.gateways.iter())
            .map(|g| g.control_systems.len())
            .sum()
    }

    /// Merge a location status reply into the zones of `location_index`.
    ///
    /// Entries are matched by id; status for things missing from the tree is ignored.
    /// Returns the number of zones that received a status.
    pub fn apply_status(&mut self, location_index: usize, status: &LocationStatus) -> usize {
        let Some(location) = self.locations.get_mut(location_index) else {
            return 0;
        };
        let mut updated = 0;
        for gw_status in &status.gateways {
            let Some(gateway) = location
                .gateways
                .iter_mut()
                .find(|g| g.gateway_info.gateway_id == gw_status.gateway_id)
            else {
                continue;
            };
            for sys_status in &gw_status.control_systems {
                let Some(system) = gateway
                    .control_systems
                    .iter_mut()
                    .find(|s| s.system_id == sys_status.system_id)
                else {
                    continue;
                };
                system.status = sys_status.system_mode_status.clone();
                for zone_status in &sys_status.zones {
                    if let Some(zone) = system.zones.iter_mut().find(|z| z.zone_id == zone_status.zone_id) {
                        zone.status = Some(zone_status.clone());
                        updated += 1;
                    }
                }
                if let (Some(dhw), Some(dhw_status)) = (system.dhw.as_mut(), sys_status.dhw.as_ref())
                    && dhw.dhw_id == dhw_status.dhw_id
                {
                    dhw.status = Some(dhw_status.clone());
                }
            }
        }
        updated
    }
}
