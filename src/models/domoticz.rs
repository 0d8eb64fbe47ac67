//! Models for the Domoticz JSON API (`/json.htm`).
//!
//! Domoticz is loose about numbers: the same field may arrive as `3`, `"3"` or `"21.0"`
//! depending on the version and device type. [`Idx`] and the `lenient_f64` helper accept both.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Domoticz row index (`idx`, `HardwareID`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Idx(pub u64);

impl core::fmt::Display for Idx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Idx {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl<'de> serde::de::Visitor<'de> for V {
            type Value = Idx;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "a non-negative integer or a string holding one")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Idx(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(value)
                    .map(Idx)
                    .map_err(|_| E::invalid_value(serde::de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value
                    .trim()
                    .parse()
                    .map(Idx)
                    .map_err(|_| E::invalid_value(serde::de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}

mod lenient_f64 {
    use serde::Deserializer;
    use serde::de::{self, Unexpected, Visitor};

    struct V;

    impl<'de> Visitor<'de> for V {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
            write!(f, "a number or a string holding one")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            Ok(Some(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse()
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        deserializer.deserialize_any(V)
    }
}

/// Envelope of every `json.htm` reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reply<T> {
    pub status: Option<String>,
    pub title: Option<String>,
    #[serde(default = "Vec::new")]
    pub result: Vec<T>,
}

impl<T> Reply<T> {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("OK")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hardware {
    pub idx: Idx,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub hardware_type: Idx,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    #[serde(rename = "idx")]
    pub idx: Idx,
    #[serde(rename = "HardwareID")]
    pub hardware_id: Idx,
    /// Evohome id of the zone or controller this device mirrors.
    #[serde(rename = "ID")]
    pub device_id: String,
    pub name: Option<String>,
    pub sub_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64::deserialize")]
    pub temp: Option<f64>,
    #[serde(default, rename = "SetPoint", deserialize_with = "lenient_f64::deserialize")]
    pub set_point: Option<f64>,
    pub status: Option<String>,
    pub until: Option<String>,
}

/// Devices of one hardware entry, keyed by Evohome id.
pub type DeviceRegistry = BTreeMap<String, Device>;
