//! Provider configuration.
//!
//! A provider is configured from a JSON object; every field is optional:
//!
//! ```json
//! { "provider_id": 42, "bind_addr": "127.0.0.1:7070",
//!   "buffer_capacity": 65536, "backend": "memory" }
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use mcol_common::{CollectorError, CollectorResult};
use mcol_engine::{RegistryConfig, DEFAULT_BUFFER_CAPACITY, MEMORY_BACKEND};

/// Default provider id.
pub const DEFAULT_PROVIDER_ID: u16 = 42;

/// Configuration for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Id requests must carry to reach this provider.
    pub provider_id: u16,
    /// Listen address; port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
    /// Samples per metric buffer.
    pub buffer_capacity: usize,
    /// Storage backend name.
    pub backend: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            provider_id: DEFAULT_PROVIDER_ID,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            backend: MEMORY_BACKEND.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Parses and validates a JSON configuration string.
    ///
    /// An empty or whitespace-only string yields the defaults.
    ///
    /// # Errors
    /// `InvalidConfig` for malformed JSON, unknown fields, or out-of-range
    /// values; `InvalidBackend` for an unknown backend name.
    pub fn from_json(raw: &str) -> CollectorResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ProviderConfig =
            serde_json::from_str(raw).map_err(|_| CollectorError::InvalidConfig)?;
        config.registry_config().validate()?;
        Ok(config)
    }

    /// Settings for the registry this provider serves.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            buffer_capacity: self.buffer_capacity,
            backend: self.backend.clone(),
        }
    }

    /// Serializes the effective configuration.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
