use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use autohelm_core::config::BackendSection;
use autohelm_core::stop::StopToken;
use autohelm_core::BackendProbe;

/// Polls the backend status endpoint and tracks availability transitions.
///
/// With no endpoint configured the backend is assumed available and the
/// probe degrades to a constant. The recovered flag is set on the
/// down-to-up transition and consumed by the first [`BackendProbe::is_recovered`]
/// call, so post-maintenance work runs exactly once.
pub struct HttpBackendProbe {
    client: reqwest::Client,
    status_url: Option<String>,
    interval: Duration,
    available: AtomicBool,
    recovered: AtomicBool,
}

impl HttpBackendProbe {
    pub fn new(config: &BackendSection) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            status_url: config.status_url.clone(),
            interval: Duration::from_secs(config.probe_interval_secs),
            available: AtomicBool::new(true),
            recovered: AtomicBool::new(false),
        })
    }

    fn record(&self, up: bool) {
        let was = self.available.swap(up, Ordering::SeqCst);
        if up && !was {
            info!("backend is available again");
            self.recovered.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BackendProbe for HttpBackendProbe {
    async fn check_now(&self) -> bool {
        let Some(url) = &self.status_url else {
            return true;
        };
        let up = match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "status probe request failed");
                false
            }
        };
        if !up {
            warn!(url, "backend unavailable");
        }
        self.record(up);
        up
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_recovered(&self) -> bool {
        self.recovered.swap(false, Ordering::SeqCst)
    }

    async fn wait_until_available(&self, stop: &mut StopToken) {
        loop {
            if self.check_now().await {
                return;
            }
            info!(interval = ?self.interval, "waiting for the backend");
            if stop.sleep(self.interval).await {
                return;
            }
        }
    }
}
