use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::decode::MessageDecoder;
use crate::error::DecodeError;
use crate::time::Timestamp;
use crate::topic::TopicDefinition;

/// A message pulled from a bag. The structured value is decoded on first
/// access to [`value`](Self::value) and cached; the raw bytes stay available.
pub struct DecodedMessage {
    topic: Arc<TopicDefinition>,
    timestamp: Timestamp,
    data: Vec<u8>,
    decoder: Arc<dyn MessageDecoder>,
    value: OnceCell<Result<Value, DecodeError>>,
}

impl DecodedMessage {
    pub fn new(
        topic: Arc<TopicDefinition>,
        timestamp: Timestamp,
        data: Vec<u8>,
        decoder: Arc<dyn MessageDecoder>,
    ) -> Self {
        Self {
            topic,
            timestamp,
            data,
            decoder,
            value: OnceCell::new(),
        }
    }

    pub fn topic(&self) -> &TopicDefinition {
        &self.topic
    }

    pub fn topic_name(&self) -> &str {
        &self.topic.name
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Decoded payload. A decode failure is returned here, per message.
    pub fn value(&self) -> Result<&Value, &DecodeError> {
        self.value
            .get_or_init(|| {
                self.decoder
                    .decode(&self.topic.type_name, &self.topic.serialization_format, &self.data)
            })
            .as_ref()
    }

    pub fn is_decoded(&self) -> bool {
        self.value.get().is_some()
    }
}

impl fmt::Debug for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedMessage")
            .field("topic", &self.topic.name)
            .field("timestamp", &self.timestamp)
            .field("size", &self.data.len())
            .field("value", &self.value.get())
            .finish()
    }
}
