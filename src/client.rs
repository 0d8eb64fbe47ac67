//! Blocking HTTP client for the Evohome v2 (EMEA) web API.
//!
//! - Blocking client using `ureq` (no async).
//! - Models live in `crate::models::evohome`; schedules in `crate::schedule`.
//! - Covers the calls needed to read an installation and to set or cancel a zone override.
//!
//! Authentication
//! - OAuth2 password grant against the portal, refreshed automatically.
//! - The token can be saved to and restored from a JSON file so consecutive runs don't log in again.

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use crate::models::evohome::*;
use crate::schedule::{self, Schedule, ScheduleCacheError, ScheduleSet};

const BASE_URL: &str = "https://tccna.honeywell.com/WebAPI/emea/api/v1";
const OAUTH_TOKEN_URL: &str = "https://tccna.honeywell.com/Auth/OAuth/Token";
// Public application credential of the official apps.
const OAUTH_CLIENT_AUTH: &str =
    "Basic NGEyMzEwODktZDJiNi00MWJkLWE1ZWItMTZhMGE0MjJiOTk5OjFhMTVjZGI4LTQyZGUtNDA3Yi1hZGQwLTA1OWY5MmM1MzBjYg==";
const OAUTH_SCOPE: &str = "EMEA-V1-Basic EMEA-V1-Anonymous EMEA-V1-Get-Current-User-Account";
const ACCEPT: &str = "application/json, application/xml, text/json, text/x-json, text/javascript, text/xml";
const TOKEN_MARGIN_SECS: i64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub enum EvohomeClientError {
    MissingCredentials,
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    Auth(String),
    Io(io::Error),
    Cache(ScheduleCacheError),
}

impl core::fmt::Display for EvohomeClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EvohomeClientError::MissingCredentials => {
                write!(f, "no saved session and no usr/pw configured to log in with")
            }
            EvohomeClientError::Transport(s) => write!(f, "transport error: {}", s),
            EvohomeClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            EvohomeClientError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
            EvohomeClientError::Auth(e) => write!(f, "auth error: {}", e),
            EvohomeClientError::Io(e) => write!(f, "io error: {}", e),
            EvohomeClientError::Cache(e) => write!(f, "schedule cache error: {}", e),
        }
    }
}

impl std::error::Error for EvohomeClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvohomeClientError::Json(e) => Some(e.inner()),
            EvohomeClientError::Io(e) => Some(e),
            EvohomeClientError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ureq::Error> for EvohomeClientError {
    fn from(value: ureq::Error) -> Self {
        EvohomeClientError::Transport(value.to_string())
    }
}

impl From<io::Error> for EvohomeClientError {
    fn from(value: io::Error) -> Self {
        EvohomeClientError::Io(value)
    }
}

impl From<ScheduleCacheError> for EvohomeClientError {
    fn from(value: ScheduleCacheError) -> Self {
        EvohomeClientError::Cache(value)
    }
}

/// Decode a JSON body, keeping the path of the offending field on failure.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, serde_path_to_error::Error<serde_json::Error>> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OAuthToken {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl OAuthToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(TOKEN_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug)]
struct OAuthState {
    token: Option<OAuthToken>,
    username: Option<String>,
    password: Option<String>,
}

type Response = http::Response<ureq::Body>;

pub struct EvohomeClient {
    agent: ureq::Agent,
    oauth: RefCell<OAuthState>,
    user_id: RefCell<Option<String>>,
}

impl EvohomeClient {
    /// Create a client without touching the network; log in with [`login`](Self::login) or
    /// [`load_auth_from_file`](Self::load_auth_from_file).
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build()
            .into();

        EvohomeClient {
            agent,
            oauth: RefCell::new(OAuthState {
                token: None,
                username,
                password,
            }),
            user_id: RefCell::new(None),
        }
    }

    fn url(path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", BASE_URL, path)
        } else {
            format!("{}/{}", BASE_URL, path)
        }
    }

    /// Log in with the configured credentials.
    pub fn login(&self) -> Result<(), EvohomeClientError> {
        let mut s = self.oauth.borrow_mut();
        let token = Self::oauth_password_grant(&self.agent, &s)?;
        s.token = Some(token);
        Ok(())
    }

    /// Reuse a session saved by an earlier run. Returns `false` when there is none or it expired.
    pub fn load_auth_from_file(&self, path: &Path) -> Result<bool, EvohomeClientError> {
        let json = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let token: OAuthToken = match decode(&json) {
            Ok(t) => t,
            Err(e) => {
                warn!("Ignoring unreadable auth file {}: {}", path.display(), e);
                return Ok(false);
            }
        };
        if !token.is_fresh(Utc::now()) && token.refresh_token.is_none() {
            debug!("Saved session in {} has expired", path.display());
            return Ok(false);
        }
        self.oauth.borrow_mut().token = Some(token);
        Ok(true)
    }

    pub fn save_auth_to_file(&self, path: &Path) -> Result<(), EvohomeClientError> {
        let s = self.oauth.borrow();
        let Some(token) = s.token.as_ref() else {
            return Ok(());
        };
        let json = serde_json::to_string(token).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // mode only applies on create
            if let Ok(meta) = fs::metadata(path)
                && meta.permissions().mode() & 0o077 != 0
            {
                fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
            }
        }
        let mut file = options.open(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Resume the saved session if possible, otherwise log in.
    pub fn connect(&self, auth_file: &Path) -> Result<(), EvohomeClientError> {
        if self.load_auth_from_file(auth_file)? {
            info!("Reusing saved Evohome session from {}", auth_file.display());
            return Ok(());
        }
        self.login()?;
        info!("Logged in to Evohome");
        Ok(())
    }

    fn oauth_password_grant(agent: &ureq::Agent, state: &OAuthState) -> Result<OAuthToken, EvohomeClientError> {
        let (Some(username), Some(password)) = (state.username.as_deref(), state.password.as_deref()) else {
            return Err(EvohomeClientError::MissingCredentials);
        };
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .header("Authorization", OAUTH_CLIENT_AUTH)
            .header("Accept", ACCEPT)
            .send_form([
                ("grant_type", "password"),
                ("scope", OAUTH_SCOPE),
                ("Username", username),
                ("Password", password),
            ]);
        Self::parse_token_response(resp)
    }

    fn oauth_refresh_grant(agent: &ureq::Agent, refresh: &str) -> Result<OAuthToken, EvohomeClientError> {
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .header("Authorization", OAUTH_CLIENT_AUTH)
            .header("Accept", ACCEPT)
            .send_form([
                ("grant_type", "refresh_token"),
                ("scope", OAUTH_SCOPE),
                ("refresh_token", refresh),
            ]);
        Self::parse_token_response(resp)
    }

    fn parse_token_response(resp: Result<Response, ureq::Error>) -> Result<OAuthToken, EvohomeClientError> {
        #[derive(Deserialize)]
        struct R {
            access_token: String,
            expires_in: i64,
            #[serde(default)]
            refresh_token: Option<String>,
        }
        let mut resp = resp?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(EvohomeClientError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }
        let R {
            access_token,
            expires_in,
            refresh_token,
        } = decode(&body).map_err(EvohomeClientError::Json)?;
        Ok(OAuthToken {
            access_token,
            expires_at: Utc::now() + TimeDelta::seconds(expires_in),
            refresh_token,
        })
    }

    /// Replace the current token, preferring the refresh grant.
    fn renew(&self, s: &mut OAuthState) -> Result<(), EvohomeClientError> {
        let refresh = s.token.as_ref().and_then(|t| t.refresh_token.clone());
        let renewed = match refresh {
            Some(r) => match Self::oauth_refresh_grant(&self.agent, &r) {
                Ok(t) => t,
                Err(e) => {
                    debug!("Token refresh failed ({}); logging in again", e);
                    Self::oauth_password_grant(&self.agent, s)?
                }
            },
            None => Self::oauth_password_grant(&self.agent, s)?,
        };
        s.token = Some(renewed);
        Ok(())
    }

    fn get_bearer(&self) -> Result<String, EvohomeClientError> {
        let mut s = self.oauth.borrow_mut();
        let needs_refresh = match &s.token {
            None => true,
            Some(t) => !t.is_fresh(Utc::now()),
        };
        if needs_refresh {
            self.renew(&mut s)?;
        }
        s.token
            .as_ref()
            .map(|t| format!("bearer {}", t.access_token))
            .ok_or_else(|| EvohomeClientError::Auth("no access token".to_string()))
    }

    /// Run an authenticated request, retrying once with a renewed token on 401.
    fn call_authed(
        &self,
        send: impl Fn(&str) -> Result<Response, ureq::Error>,
    ) -> Result<String, EvohomeClientError> {
        let mut resp = send(&self.get_bearer()?)?;
        if resp.status() == http::StatusCode::UNAUTHORIZED {
            debug!("Portal answered 401; renewing token");
            {
                let mut s = self.oauth.borrow_mut();
                self.renew(&mut s)?;
            }
            resp = send(&self.get_bearer()?)?;
        }
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(EvohomeClientError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, EvohomeClientError> {
        let url = Self::url(path);
        let body = self.call_authed(|bearer| {
            let mut req = self.agent.get(&url).header("Accept", ACCEPT).header("Authorization", bearer);
            for (k, v) in query {
                req = req.query(*k, *v);
            }
            req.call()
        })?;
        decode(&body).map_err(EvohomeClientError::Json)
    }

    fn put_json<B: Serialize>(&self, path: &str, payload: &B) -> Result<(), EvohomeClientError> {
        let url = Self::url(path);
        self.call_authed(|bearer| {
            self.agent
                .put(&url)
                .header("Accept", ACCEPT)
                .header("Authorization", bearer)
                .send_json(payload)
        })?;
        Ok(())
    }

    pub fn user_account(&self) -> Result<UserAccount, EvohomeClientError> {
        self.get_json("/userAccount", &[])
    }

    fn user_id(&self) -> Result<String, EvohomeClientError> {
        if let Some(id) = self.user_id.borrow().as_ref() {
            return Ok(id.clone());
        }
        let account = self.user_account()?;
        *self.user_id.borrow_mut() = Some(account.user_id.clone());
        Ok(account.user_id)
    }

    /// Fetch the whole installation tree of the account.
    pub fn full_installation(&self) -> Result<Installation, EvohomeClientError> {
        let user_id = self.user_id()?;
        self.get_json(
            "/location/installationInfo",
            &[("userId", user_id.as_str()), ("includeTemperatureControlSystems", "True")],
        )
    }

    pub fn location_status(&self, location_id: &str) -> Result<LocationStatus, EvohomeClientError> {
        self.get_json(
            &format!("/location/{}/status", location_id),
            &[("includeTemperatureControlSystems", "True")],
        )
    }

    /// Fetch the status of one location and merge it into `installation`.
    pub fn fetch_status(&self, installation: &mut Installation, location_index: usize) -> Result<(), EvohomeClientError> {
        let Some(location_id) = installation
            .locations
            .get(location_index)
            .map(|l| l.location_id().to_string())
        else {
            return Ok(());
        };
        let status = self.location_status(&location_id)?;
        let updated = installation.apply_status(location_index, &status);
        debug!("Status for location {}: {} zone(s) updated", location_id, updated);
        Ok(())
    }

    pub fn zone_schedule(&self, zone_id: &str) -> Result<Schedule, EvohomeClientError> {
        self.get_json(&format!("/temperatureZone/{}/schedule", zone_id), &[])
    }

    pub fn dhw_schedule(&self, dhw_id: &str) -> Result<Schedule, EvohomeClientError> {
        self.get_json(&format!("/domesticHotWater/{}/schedule", dhw_id), &[])
    }

    /// Fetch the schedule of every zone (and the hot water) of `system`.
    pub fn schedules(&self, system: &ControlSystem) -> Result<ScheduleSet, EvohomeClientError> {
        let mut set = ScheduleSet::new();
        for zone in &system.zones {
            let schedule = self.zone_schedule(&zone.zone_id)?;
            if schedule.is_empty() {
                debug!("Zone {} has no switchpoints", zone.zone_id);
            }
            set.insert(zone.zone_id.clone(), schedule);
        }
        if let Some(dhw) = system.dhw.as_ref() {
            set.insert(dhw.dhw_id.clone(), self.dhw_schedule(&dhw.dhw_id)?);
        }
        Ok(set)
    }

    /// Load schedules from the cache file when it is fresh, otherwise fetch them and rewrite the cache.
    pub fn fetch_or_load_schedules(
        &self,
        system: &ControlSystem,
        cache: &Path,
        max_age: Duration,
        force_reload: bool,
    ) -> Result<ScheduleSet, EvohomeClientError> {
        if !force_reload {
            match schedule::load_cache_covering(cache, max_age, system.schedule_ids()) {
                Ok(Some(set)) => {
                    debug!("Read {} schedule(s) from {}", set.len(), cache.display());
                    return Ok(set);
                }
                Ok(None) => {}
                Err(e) => warn!("Discarding schedule cache {}: {}", cache.display(), e),
            }
        }
        info!("Reloading schedules cache {}", cache.display());
        let set = self.schedules(system)?;
        schedule::write_cache(cache, &set)?;
        Ok(set)
    }

    /// Override a zone's setpoint, until `until_utc` (a `Z` timestamp) or permanently.
    pub fn set_temperature(
        &self,
        zone_id: &str,
        setpoint: f64,
        until_utc: Option<&str>,
    ) -> Result<(), EvohomeClientError> {
        let request = HeatSetpointRequest {
            setpoint_mode: if until_utc.is_some() {
                setpoint_modes::TEMPORARY_OVERRIDE
            } else {
                setpoint_modes::PERMANENT_OVERRIDE
            },
            heat_setpoint_value: setpoint,
            time_until: until_utc.map(str::to_string),
        };
        self.put_json(&format!("/temperatureZone/{}/heatSetpoint", zone_id), &request)
    }

    /// Return a zone to its schedule.
    pub fn cancel_temperature_override(&self, zone_id: &str) -> Result<(), EvohomeClientError> {
        let request = HeatSetpointRequest {
            setpoint_mode: setpoint_modes::FOLLOW_SCHEDULE,
            heat_setpoint_value: 0.0,
            time_until: None,
        };
        self.put_json(&format!("/temperatureZone/{}/heatSetpoint", zone_id), &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_freshness_has_margin() {
        let now = Utc::now();
        let token = OAuthToken {
            access_token: "a".into(),
            expires_at: now + TimeDelta::seconds(TOKEN_MARGIN_SECS + 60),
            refresh_token: None,
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + TimeDelta::seconds(61)));
    }

    #[test]
    fn saved_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        let client = EvohomeClient::new(None, None);
        assert!(!client.load_auth_from_file(&path).unwrap());
        // nothing to save yet
        client.save_auth_to_file(&path).unwrap();
        assert!(!path.exists());

        client.oauth.borrow_mut().token = Some(OAuthToken {
            access_token: "abc".into(),
            expires_at: Utc::now() + TimeDelta::hours(1),
            refresh_token: Some("def".into()),
        });
        client.save_auth_to_file(&path).unwrap();

        let restored = EvohomeClient::new(None, None);
        assert!(restored.load_auth_from_file(&path).unwrap());
        assert_eq!(restored.get_bearer().unwrap(), "bearer abc");
    }

    #[cfg(unix)]
    #[test]
    fn saved_session_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let client = EvohomeClient::new(None, None);
        client.oauth.borrow_mut().token = Some(OAuthToken {
            access_token: "abc".into(),
            expires_at: Utc::now() + TimeDelta::hours(1),
            refresh_token: None,
        });
        client.save_auth_to_file(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);

        let fresh = dir.path().join("fresh.json");
        client.save_auth_to_file(&fresh).unwrap();
        assert_eq!(fs::metadata(&fresh).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn expired_session_without_refresh_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let token = OAuthToken {
            access_token: "abc".into(),
            expires_at: Utc::now() - TimeDelta::hours(1),
            refresh_token: None,
        };
        fs::write(&path, serde_json::to_string(&token).unwrap()).unwrap();
        assert!(!EvohomeClient::new(None, None).load_auth_from_file(&path).unwrap());
    }

    #[test]
    fn login_without_credentials_fails_early() {
        let client = EvohomeClient::new(Some("me".into()), None);
        assert!(matches!(client.login(), Err(EvohomeClientError::MissingCredentials)));
    }

    #[test]
    fn override_request_shape() {
        let request = HeatSetpointRequest {
            setpoint_mode: setpoint_modes::TEMPORARY_OVERRIDE,
            heat_setpoint_value: 21.5,
            time_until: Some("2024-03-10T22:00:00Z".into()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "SetpointMode": "TemporaryOverride",
                "HeatSetpointValue": 21.5,
                "TimeUntil": "2024-03-10T22:00:00Z"
            })
        );
    }

    #[test]
    fn decode_reports_field_path() {
        let err = decode::<LocationStatus>(r#"{"locationId": "1", "gateways": [{"gatewayId": 5}]}"#).unwrap_err();
        assert_eq!(err.path().to_string(), "gateways[0].gatewayId");
    }
}
