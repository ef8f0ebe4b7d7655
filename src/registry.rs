use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BagError, Result};
use crate::topic::TopicDefinition;

/// Logical topic catalog for a whole bag, deduplicated by name across
/// segments. Iteration order is first-sighting order.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    topics: Vec<Arc<TopicDefinition>>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a topic. A repeat sighting must agree on type and
    /// serialization format.
    pub fn register(&mut self, topic: &Arc<TopicDefinition>) -> Result<()> {
        if let Some(&idx) = self.by_name.get(&topic.name) {
            let existing = &self.topics[idx];
            if !existing.is_compatible_with(topic) {
                return Err(BagError::SchemaConflict {
                    name: topic.name.clone(),
                    existing: Box::new(existing.as_ref().clone()),
                    incoming: Box::new(topic.as_ref().clone()),
                });
            }
            if existing.offered_qos_profiles != topic.offered_qos_profiles {
                debug!(topic = %topic.name, "QoS differs between segments, keeping first sighting");
            }
            return Ok(());
        }
        self.by_name.insert(topic.name.clone(), self.topics.len());
        self.topics.push(Arc::clone(topic));
        Ok(())
    }

    /// Registers a whole catalog, stopping at the first conflict.
    pub fn merge_catalog<'a, I>(&mut self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Arc<TopicDefinition>>,
    {
        topics.into_iter().try_for_each(|topic| self.register(topic))
    }

    pub fn all(&self) -> &[Arc<TopicDefinition>] {
        &self.topics
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TopicDefinition>> {
        self.by_name.get(name).map(|&idx| &self.topics[idx])
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.by_name.clear();
    }
}
