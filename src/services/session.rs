use crate::client::EvohomeClient;
use crate::config::Config;
use crate::error::Error;
use crate::models::evohome::{ControlSystem, Installation};
use crate::schedule::ScheduleSet;
use crate::selector::{self, Level, SelectError, SystemPath};
use log::{debug, info, warn};

/// Logged-in client plus the selected control system, its status and its schedules.
pub struct Session {
    pub client: EvohomeClient,
    pub installation: Installation,
    pub path: SystemPath,
    pub system: ControlSystem,
    pub schedules: ScheduleSet,
}

/// Logged-in client, with its session saved for the next run.
pub fn connect(cfg: &Config) -> Result<EvohomeClient, Error> {
    let client = EvohomeClient::new(cfg.username.clone(), cfg.password.clone());
    client.connect(&cfg.auth_file)?;
    if let Err(e) = client.save_auth_to_file(&cfg.auth_file) {
        warn!("Could not save session to {}: {}", cfg.auth_file.display(), e);
    }
    Ok(client)
}

impl Session {
    pub fn open(cfg: &Config, reload_schedules: bool) -> Result<Session, Error> {
        let client = connect(cfg)?;

        let mut installation = client.full_installation()?;
        debug!(
            "Installation has {} location(s), {} control system(s)",
            installation.locations.len(),
            installation.control_system_count()
        );

        let path = selector::select(&installation, &cfg.hints)?;
        client.fetch_status(&mut installation, path.location)?;
        let system = installation
            .control_system(&path)
            .cloned()
            .ok_or(SelectError::Empty {
                level: Level::ControlSystem,
            })?;
        info!(
            "Using control system {} ({} zone(s){})",
            system.system_id,
            system.zones.len(),
            if system.dhw.is_some() { ", hot water" } else { "" }
        );

        let schedules = client.fetch_or_load_schedules(
            &system,
            &cfg.schedule_cache,
            cfg.schedule_cache_max_age,
            reload_schedules,
        )?;

        Ok(Session {
            client,
            installation,
            path,
            system,
            schedules,
        })
    }

    pub fn location_name(&self) -> &str {
        self.installation
            .locations
            .get(self.path.location)
            .and_then(|l| l.location_info.name.as_deref())
            .unwrap_or("")
    }
}
