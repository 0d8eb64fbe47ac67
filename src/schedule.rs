//! Weekly zone schedules, switchpoint resolution and the local schedule cache.
//!
//! Schedules can only be fetched one zone at a time, which is slow, and they rarely change. They
//! are therefore kept in a JSON cache file keyed by zone id (a [`ScheduleSet`]).
//!
//! Switchpoint times are local wall-clock times without a date. Anything derived from them is
//! marked [`TimeMarker::AssumedLocal`].

use crate::timezone::{TimeMarker, Timestamp};
use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, Weekday};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::time::{Duration, SystemTime};
use std::{fs, io};

/// Zone (or DHW) id → schedule.
pub type ScheduleSet = BTreeMap<String, Schedule>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub daily_schedules: Vec<DailySchedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySchedule {
    #[serde(with = "day_of_week")]
    pub day_of_week: Weekday,
    #[serde(default)]
    pub switchpoints: Vec<Switchpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Switchpoint {
    pub time_of_day: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_setpoint: Option<f64>,
    // hot water zones switch a state instead of a temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhw_state: Option<String>,
}

impl Switchpoint {
    /// Setpoint rendered the way Domoticz expects it: temperature, or DHW state.
    pub fn setpoint_value(&self) -> Option<String> {
        self.heat_setpoint
            .map(|t| t.to_string())
            .or_else(|| self.dhw_state.clone())
    }
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.daily_schedules.iter().all(|d| d.switchpoints.is_empty())
    }

    pub fn switchpoints_on(&self, day: Weekday) -> impl Iterator<Item = &Switchpoint> {
        self.daily_schedules
            .iter()
            .filter(move |d| d.day_of_week == day)
            .flat_map(|d| d.switchpoints.iter())
    }

    /// The first switchpoint strictly after `reference`, with the date it falls on.
    ///
    /// Looks at the rest of today, then the following seven days (wrapping Sunday → Monday).
    pub fn next_after(&self, reference: NaiveDateTime) -> Option<(NaiveDateTime, &Switchpoint)> {
        let today = reference.date();
        let now = reference.time();

        if let Some(sp) = self
            .switchpoints_on(today.weekday())
            .filter(|sp| sp.time_of_day > now)
            .min_by_key(|sp| sp.time_of_day)
        {
            return Some((today.and_time(sp.time_of_day), sp));
        }

        for offset in 1..=7 {
            let date = today.checked_add_days(Days::new(offset))?;
            if let Some(sp) = self.switchpoints_on(date.weekday()).min_by_key(|sp| sp.time_of_day) {
                return Some((date.and_time(sp.time_of_day), sp));
            }
        }
        None
    }

    /// The switchpoint in force at `reference`: the last one at or before it, looking back up to a week.
    pub fn in_force_at(&self, reference: NaiveDateTime) -> Option<&Switchpoint> {
        let today = reference.date();
        let now = reference.time();

        if let Some(sp) = self
            .switchpoints_on(today.weekday())
            .filter(|sp| sp.time_of_day <= now)
            .max_by_key(|sp| sp.time_of_day)
        {
            return Some(sp);
        }

        for offset in 1..=7 {
            let date = today.checked_sub_days(Days::new(offset))?;
            if let Some(sp) = self.switchpoints_on(date.weekday()).max_by_key(|sp| sp.time_of_day) {
                return Some(sp);
            }
        }
        None
    }
}

/// Next scheduled change for `zone_id`, as an assumed-local timestamp.
///
/// `None` when the zone has no schedule or the schedule has no switchpoints at all.
pub fn next_switchpoint(schedules: &ScheduleSet, zone_id: &str, reference: NaiveDateTime) -> Option<Timestamp> {
    let (at, _) = schedules.get(zone_id)?.next_after(reference)?;
    Some(Timestamp::new(at, Some(TimeMarker::AssumedLocal)))
}

/// Scheduled setpoint currently in force for `zone_id`.
pub fn current_setpoint(schedules: &ScheduleSet, zone_id: &str, reference: NaiveDateTime) -> Option<String> {
    schedules.get(zone_id)?.in_force_at(reference)?.setpoint_value()
}

// =====================
// Cache file
// =====================

#[derive(Debug)]
pub enum ScheduleCacheError {
    Io(io::Error),
    Json(serde_path_to_error::Error<serde_json::Error>),
}

impl Display for ScheduleCacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleCacheError::Io(e) => write!(f, "io error: {}", e),
            ScheduleCacheError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
        }
    }
}

impl Error for ScheduleCacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScheduleCacheError::Io(e) => Some(e),
            ScheduleCacheError::Json(e) => Some(e.inner()),
        }
    }
}

impl From<io::Error> for ScheduleCacheError {
    fn from(value: io::Error) -> Self {
        ScheduleCacheError::Io(value)
    }
}

/// Read the cache if it exists and was written less than `max_age` ago.
pub fn load_cache(path: &Path, max_age: Duration) -> Result<Option<ScheduleSet>, ScheduleCacheError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Schedule cache {} not present", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let age = meta
        .modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or_default();
    if age >= max_age {
        debug!(
            "Schedule cache {} is stale ({}s old, max {}s)",
            path.display(),
            age.as_secs(),
            max_age.as_secs()
        );
        return Ok(None);
    }

    let json = fs::read_to_string(path)?;
    let de = &mut serde_json::Deserializer::from_str(&json);
    let set = serde_path_to_error::deserialize(de).map_err(ScheduleCacheError::Json)?;
    Ok(Some(set))
}

/// [`load_cache`], treating a cache that lacks a schedule for any of `ids` as stale.
pub fn load_cache_covering<'a>(
    path: &Path,
    max_age: Duration,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<Option<ScheduleSet>, ScheduleCacheError> {
    let Some(set) = load_cache(path, max_age)? else {
        return Ok(None);
    };
    let missing: Vec<&str> = ids.into_iter().filter(|id| !set.contains_key(*id)).collect();
    if !missing.is_empty() {
        debug!("Schedule cache {} has no schedule for {}", path.display(), missing.join(", "));
        return Ok(None);
    }
    Ok(Some(set))
}

pub fn write_cache(path: &Path, schedules: &ScheduleSet) -> Result<(), ScheduleCacheError> {
    let json = serde_json::to_string_pretty(schedules)
        .map_err(|e| ScheduleCacheError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    fs::write(path, json)?;
    Ok(())
}

/// Portal day names, accepting the numeric form (0 = Monday) as well.
mod day_of_week {
    use chrono::Weekday;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    const NAMES: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

    pub fn serialize<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(NAMES[day.num_days_from_monday() as usize])
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = Weekday;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a day name or a number 0 (Monday) to 6 (Sunday)")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value
                    .parse::<Weekday>()
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                u8::try_from(value)
                    .ok()
                    .and_then(|v| Weekday::try_from(v).ok())
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(value), &self))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                match u64::try_from(value) {
                    Ok(v) => self.visit_u64(v),
                    Err(_) => Err(E::invalid_value(de::Unexpected::Signed(value), &self)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
