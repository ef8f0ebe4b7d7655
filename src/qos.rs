//! QoS profiles carried in a topic's `offered_qos_profiles` column.
//!
//! The column holds a YAML list. Older recorders wrote the policies as
//! integers, newer ones as lowercase names; both spellings are accepted.
//! The reader never interprets these beyond handing them back.

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! qos_policy {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawPolicy::deserialize(deserializer)? {
                    RawPolicy::Code(code) => Self::from_code(code),
                    RawPolicy::Label(label) => Self::from_label(&label.to_ascii_lowercase()),
                }
                .ok_or_else(|| {
                    serde::de::Error::custom(concat!("unrecognized ", stringify!($name), " value"))
                })
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPolicy {
    Code(i64),
    Label(String),
}

qos_policy!(
    /// History policy.
    History {
        SystemDefault = 0 => "system_default",
        KeepLast = 1 => "keep_last",
        KeepAll = 2 => "keep_all",
        Unknown = 3 => "unknown",
    }
);

qos_policy!(
    Reliability {
        SystemDefault = 0 => "system_default",
        Reliable = 1 => "reliable",
        BestEffort = 2 => "best_effort",
        Unknown = 3 => "unknown",
    }
);

qos_policy!(
    Durability {
        SystemDefault = 0 => "system_default",
        TransientLocal = 1 => "transient_local",
        Volatile = 2 => "volatile",
        Unknown = 3 => "unknown",
    }
);

qos_policy!(
    /// Liveliness policy. Code 2 is the deprecated manual-by-node mode.
    Liveliness {
        SystemDefault = 0 => "system_default",
        Automatic = 1 => "automatic",
        ManualByNode = 2 => "manual_by_node",
        ManualByTopic = 3 => "manual_by_topic",
        Unknown = 4 => "unknown",
    }
);

/// A QoS duration. Recorders use `i32::MAX` seconds / `u32::MAX`
/// nanoseconds, or `i64::MAX` nanoseconds split the same way, for "infinite".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosDuration {
    pub sec: i64,
    pub nsec: u32,
}

impl QosDuration {
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        (self.sec == i64::from(i32::MAX) && self.nsec == u32::MAX)
            || (self.sec == 9_223_372_036 && self.nsec == 854_775_807)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosProfile {
    pub history: History,
    pub depth: u64,
    pub reliability: Reliability,
    pub durability: Durability,
    pub deadline: QosDuration,
    pub lifespan: QosDuration,
    pub liveliness: Liveliness,
    pub liveliness_lease_duration: QosDuration,
    pub avoid_ros_namespace_conventions: bool,
}

/// Parses the YAML blob stored with a topic. Empty input means no profiles.
pub fn parse_qos_profiles(yaml: &str) -> Result<Vec<QosProfile>, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Option<Vec<QosProfile>> = serde_yaml::from_str(yaml)?;
    Ok(parsed.unwrap_or_default())
}
