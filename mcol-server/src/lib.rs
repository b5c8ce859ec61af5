// mcol-server - Network provider for the metrics collector
//
// Serves a metric registry over TCP: remote consumers list metric ids and
// fetch the most recent samples of a metric.

pub mod config;
pub mod provider;
pub mod server;
pub mod stats;

pub use config::{ProviderConfig, DEFAULT_PROVIDER_ID};
pub use provider::Provider;
pub use server::{handle_connection, Server};
pub use stats::{LatencySnapshot, RequestStats, StatsSnapshot};
