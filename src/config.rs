//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs for a [`Cache`](crate::engine::Cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Deadline for each remote call, in milliseconds. `None` waits forever.
    #[serde(with = "millis")]
    pub remote_timeout: Option<Duration>,
    /// Queue mutations on the same identifier instead of letting them race.
    pub serialize_per_entity: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { remote_timeout: Some(DEFAULT_REMOTE_TIMEOUT), serialize_per_entity: true }
    }
}

impl CacheConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_serialization(mut self, on: bool) -> Self {
        self.serialize_per_entity = on;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
