//! Pick the one temperature control system to work with.
//!
//! Hints come from the configuration file, one per level, either as a zero-based index
//! (`location`, `gateway`, `controlsystem`) or as a portal id (`locationId`, `gatewayId`,
//! `systemId`). Absent levels default to index 0.
//!
//! The search only produces a [`SystemPath`]; looking it up is
//! [`Installation::control_system`], and reporting failures is up to the caller.

use crate::models::evohome::{ControlSystem, Installation};
use core::fmt;
use std::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    Index(usize),
    Id(String),
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::Index(i) => write!(f, "index {}", i),
            Hint::Id(id) => write!(f, "id {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionHints {
    pub location: Option<Hint>,
    pub gateway: Option<Hint>,
    pub control_system: Option<Hint>,
    /// Where the hints were read from, for error messages.
    pub source: String,
}

impl SelectionHints {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.gateway.is_none() && self.control_system.is_none()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    Location,
    Gateway,
    ControlSystem,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Location => "location",
            Level::Gateway => "gateway",
            Level::ControlSystem => "temperature control system",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SystemPath {
    pub location: usize,
    pub gateway: usize,
    pub system: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// A configured hint does not resolve.
    NotFound { level: Level, hint: Hint, source: String },
    /// A defaulted level has nothing at index 0.
    Empty { level: Level },
    /// More than one system is reachable and nothing disambiguates.
    Ambiguous { systems: usize, source: String },
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::NotFound {
                level,
                hint: Hint::Index(i),
                source,
            } => write!(f, "the Evohome {} specified in {} cannot be found (index {})", level, source, i),
            SelectError::NotFound {
                level,
                hint: Hint::Id(id),
                source,
            } => write!(f, "the Evohome {} ID specified in {} cannot be found ({})", level, source, id),
            SelectError::Empty { level } => write!(f, "the Evohome installation has no {}", level),
            SelectError::Ambiguous { systems, source } => write!(
                f,
                "multiple Evohome systems found ({}) - don't know which one to use; \
                 set location/gateway/controlsystem or locationId/gatewayId/systemId in {}",
                systems, source
            ),
        }
    }
}

impl Error for SelectError {}

fn resolve<T>(
    items: &[T],
    hint: Option<&Hint>,
    id_of: impl Fn(&T) -> &str,
    level: Level,
    source: &str,
) -> Result<usize, SelectError> {
    let Some(hint) = hint else {
        return if items.is_empty() {
            Err(SelectError::Empty { level })
        } else {
            Ok(0)
        };
    };
    let found = match hint {
        Hint::Index(i) => (*i < items.len()).then_some(*i),
        Hint::Id(id) => items.iter().position(|item| id_of(item) == id.as_str()),
    };
    found.ok_or_else(|| SelectError::NotFound {
        level,
        hint: hint.clone(),
        source: source.to_string(),
    })
}

/// The only system of the installation, if there is exactly one.
fn single_system(installation: &Installation) -> Option<SystemPath> {
    let mut found = None;
    for (l, location) in installation.locations.iter().enumerate() {
        for (g, gateway) in location.gateways.iter().enumerate() {
            for s in 0..gateway.control_systems.len() {
                if found.is_some() {
                    return None;
                }
                found = Some(SystemPath {
                    location: l,
                    gateway: g,
                    system: s,
                });
            }
        }
    }
    found
}

/// Resolve `hints` against `installation`.
pub fn select(installation: &Installation, hints: &SelectionHints) -> Result<SystemPath, SelectError> {
    let source = hints.source.as_str();

    if hints.is_empty() {
        return match installation.control_system_count() {
            0 => Err(SelectError::Empty {
                level: Level::ControlSystem,
            }),
            1 => single_system(installation).ok_or(SelectError::Empty {
                level: Level::ControlSystem,
            }),
            n => Err(SelectError::Ambiguous {
                systems: n,
                source: source.to_string(),
            }),
        };
    }

    let l = resolve(
        &installation.locations,
        hints.location.as_ref(),
        |l| l.location_id(),
        Level::Location,
        source,
    )?;
    let location = &installation.locations[l];
    let mut unique = false;
    if hints.location.is_some() {
        unique = location.gateways.len() == 1 && location.gateways[0].control_systems.len() == 1;
    }

    let g = resolve(
        &location.gateways,
        hints.gateway.as_ref(),
        |g| g.gateway_id(),
        Level::Gateway,
        source,
    )?;
    let gateway = &location.gateways[g];
    if hints.gateway.is_some() {
        unique = gateway.control_systems.len() == 1;
    }

    let s = resolve(
        &gateway.control_systems,
        hints.control_system.as_ref(),
        |s| s.system_id.as_str(),
        Level::ControlSystem,
        source,
    )?;
    if hints.control_system.is_some() {
        unique = true;
    }

    if !unique {
        let systems = installation.control_system_count();
        if systems > 1 {
            return Err(SelectError::Ambiguous {
                systems,
                source: source.to_string(),
            });
        }
    }

    Ok(SystemPath {
        location: l,
        gateway: g,
        system: s,
    })
}

impl Installation {
    pub fn control_system(&self, path: &SystemPath) -> Option<&ControlSystem> {
        self.locations
            .get(path.location)?
            .gateways
            .get(path.gateway)?
            .control_systems
            .get(path.system)
    }
}
