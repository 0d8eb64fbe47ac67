use crate::models::evohome::ControlSystem;
use crate::zone::{ZoneData, or_empty};
use std::fmt::Write;

/// Console report: system summary followed by one row per zone.
pub fn render(location_name: &str, system: &ControlSystem, zones: &[ZoneData]) -> String {
    let mut out = String::new();
    let mode = system.status.as_ref().and_then(|s| s.mode.as_deref()).unwrap_or("");
    let _ = writeln!(
        out,
        "Location: {}  System: {} ({})  Mode: {}",
        location_name,
        system.system_id,
        system.model_type.as_deref().unwrap_or(""),
        mode
    );
    let _ = writeln!(
        out,
        "{:<10} {:>6} {:<18} {:>8} {:<19} {}",
        "id", "temp", "mode", "setpoint", "until", "name"
    );
    for z in zones {
        let _ = writeln!(
            out,
            "{:<10} {:>6} {:<18} {:>8} {:<19} {}",
            z.zone_id,
            z.temperature_str(),
            or_empty(&z.setpoint_mode),
            or_empty(&z.target),
            or_empty(&z.until),
            or_empty(&z.name)
        );
    }
    out
}
