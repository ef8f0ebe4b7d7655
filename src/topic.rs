use serde::{Deserialize, Serialize};

use crate::qos::QosProfile;

/// A named, typed channel as recorded in a segment's `topics` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub name: String,
    /// Schema identifier, e.g. `std_msgs/msg/String`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub serialization_format: String,
    #[serde(default)]
    pub offered_qos_profiles: Vec<QosProfile>,
}

impl TopicDefinition {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        serialization_format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            serialization_format: serialization_format.into(),
            offered_qos_profiles: Vec::new(),
        }
    }

    /// Two sightings of the same topic agree if type and format match.
    /// QoS may legitimately differ between recordings.
    #[must_use]
    pub fn is_compatible_with(&self, other: &TopicDefinition) -> bool {
        self.type_name == other.type_name && self.serialization_format == other.serialization_format
    }
}
