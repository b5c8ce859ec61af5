//! Collector provider daemon.
//!
//! Usage: `mcol-server [config.json]`
//!
//! Serves one provider until Ctrl-C. The provider publishes its own request
//! stats as metrics in the `mcol` namespace, sampled once per second.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mcol_common::{MetricKind, TagList};
use mcol_server::{Provider, ProviderConfig, Server};

const SELF_NAMESPACE: &str = "mcol";
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            ProviderConfig::from_json(&raw).with_context(|| format!("parsing config file {path}"))?
        }
        None => ProviderConfig::default(),
    };
    info!(config = %config.to_json(), "starting provider");

    let provider = Arc::new(Provider::new(&config).context("building provider")?);
    let server = Server::bind(config.bind_addr, provider.clone())
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    let sampler = tokio::spawn(sample_self(provider.clone()));
    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler failed");
            }
        })
        .await?;
    sampler.abort();

    provider.registry().destroy_all();
    Ok(())
}

/// Appends the provider's request totals to its own registry.
async fn sample_self(provider: Arc<Provider>) {
    let registry = provider.registry();
    let tags = || TagList::from_tags([format!("provider:{}", provider.id())]);
    let requests = registry.create(SELF_NAMESPACE, "requests_total", MetricKind::Counter, "requests served", tags());
    let errors = registry.create(SELF_NAMESPACE, "errors_total", MetricKind::Counter, "failed requests", tags());
    let (requests, errors) = match (requests, errors) {
        (Ok(requests), Ok(errors)) => (requests, errors),
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "self metrics disabled");
            return;
        }
    };

    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    loop {
        ticker.tick().await;
        let stats = provider.stats();
        for (metric, value) in [(&requests, stats.requests_total), (&errors, stats.errors_total)] {
            if let Err(err) = metric.update(value as f64) {
                warn!(metric = metric.name(), error = %err, "self metric update failed");
                return;
            }
        }
    }
}
