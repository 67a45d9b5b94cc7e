use config::{Config, File};
use devmesh_error::MeshResult;
use serde::Deserialize;
use std::{ops::Deref, sync::Arc, time::Duration};

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings(Arc::new(Inner::default()))
    }
}

impl Settings {
    pub fn new(config_path: &str) -> MeshResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("DEVMESH")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    /// Build settings from an already-deserialized inner block (tests).
    pub fn from_inner(inner: Inner) -> Self {
        Settings(Arc::new(inner))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub message: MessageSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub handler: HandlerSettings,
}

/// Reply rendezvous tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MessageSettings {
    /// Default number of seconds a sender waits for the device reply.
    #[serde(default = "MessageSettings::await_max_seconds_default")]
    pub await_max_seconds: u64,
    /// Extra TTL on the reply bucket and semaphore beyond the await window,
    /// so late replies are garbage-collected rather than leaked.
    #[serde(default = "MessageSettings::reply_ttl_padding_seconds_default")]
    pub reply_ttl_padding_seconds: u64,
}

impl Default for MessageSettings {
    fn default() -> Self {
        MessageSettings {
            await_max_seconds: MessageSettings::await_max_seconds_default(),
            reply_ttl_padding_seconds: MessageSettings::reply_ttl_padding_seconds_default(),
        }
    }
}

impl MessageSettings {
    fn await_max_seconds_default() -> u64 {
        30
    }

    fn reply_ttl_padding_seconds_default() -> u64 {
        10
    }

    #[inline]
    pub fn max_await(&self) -> Duration {
        Duration::from_secs(self.await_max_seconds)
    }

    /// TTL applied to the reply bucket and the reply semaphore.
    #[inline]
    pub fn reply_ttl(&self) -> Duration {
        Duration::from_secs(self.await_max_seconds + self.reply_ttl_padding_seconds)
    }

    /// TTL for a caller-supplied await window.
    #[inline]
    pub fn reply_ttl_for(&self, max_await: Duration) -> Duration {
        max_await + Duration::from_secs(self.reply_ttl_padding_seconds)
    }
}

/// Session liveness probing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StateSettings {
    /// How long a state check waits for the owning gateway to answer.
    #[serde(default = "StateSettings::check_timeout_ms_default")]
    pub check_timeout_ms: u64,
}

impl Default for StateSettings {
    fn default() -> Self {
        StateSettings {
            check_timeout_ms: StateSettings::check_timeout_ms_default(),
        }
    }
}

impl StateSettings {
    fn check_timeout_ms_default() -> u64 {
        2000
    }

    #[inline]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

/// Gateway-side dispatch tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HandlerSettings {
    /// Capacity of each per-device inbound queue.
    #[serde(default = "HandlerSettings::queue_capacity_default")]
    pub queue_capacity: usize,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        HandlerSettings {
            queue_capacity: HandlerSettings::queue_capacity_default(),
        }
    }
}

impl HandlerSettings {
    fn queue_capacity_default() -> usize {
        1024
    }
}
