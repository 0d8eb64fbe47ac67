use crate::models::evohome::ControlSystem;
use crate::schedule::{self, ScheduleSet};
use crate::timezone::{TIMESTAMP_LEN, TimeContext, TimestampError};
use crate::zone::ZoneData;
use chrono::NaiveDateTime;

/// Local `until` to show and push for a zone.
///
/// Overrides carry their own UTC end time; everything else runs until the next switchpoint
/// of its schedule. An `until` too short to be a timestamp counts as none at all.
pub fn resolve_until(
    zone: &ZoneData,
    schedules: &ScheduleSet,
    tc: &TimeContext,
    reference: NaiveDateTime,
) -> Result<Option<String>, TimestampError> {
    match zone.until.as_deref() {
        None => schedule::next_switchpoint(schedules, &zone.zone_id, reference)
            .map(|ts| tc.utc_to_local(&ts.to_string()))
            .transpose(),
        Some(until) if until.len() >= TIMESTAMP_LEN => tc.utc_to_local(until).map(Some),
        Some(_) => Ok(None),
    }
}

/// Project every zone of `system` (hot water last) with its until resolved to local time.
///
/// Fails on the first zone whose until cannot be resolved, so callers never act on a partial set.
pub fn resolved_zones(
    system: &ControlSystem,
    schedules: &ScheduleSet,
    tc: &TimeContext,
    reference: NaiveDateTime,
) -> Result<Vec<ZoneData>, TimestampError> {
    let mut zones: Vec<ZoneData> = system.zones.iter().map(ZoneData::for_zone).collect();
    if let Some(dhw) = system.dhw.as_ref() {
        zones.push(ZoneData::for_hot_water(dhw));
    }
    for zone in zones.iter_mut() {
        zone.until = resolve_until(zone, schedules, tc, reference)?;
    }
    Ok(zones)
}
