use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autohelm_core::config::{FaultsSection, NotifySection, WorkerSection};
use autohelm_core::Diagnostics;

/// Captures a diagnostic report on a fault and submits it.
///
/// A report is a small JSON document identifying the instance, the fault
/// context and when it happened. It is written under the configured
/// diagnostics directory and optionally POSTed to a report endpoint; both
/// legs are best-effort and run on a spawned task.
pub struct DiagnosticSink {
    client: reqwest::Client,
    report_url: Option<String>,
    dir: PathBuf,
    save: bool,
    instance: String,
}

impl DiagnosticSink {
    pub fn new(notify: &NotifySection, faults: &FaultsSection, worker: &WorkerSection) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            report_url: notify.report_url.clone(),
            dir: PathBuf::from(&worker.diagnostics_dir),
            save: faults.save_diagnostics,
            instance: worker.instance.clone(),
        }
    }

    fn report(&self, id: Uuid, context: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id.to_string(),
            "instance": self.instance,
            "context": context,
            "captured_at": Utc::now().to_rfc3339(),
        })
    }
}

impl Diagnostics for DiagnosticSink {
    fn capture_and_submit(&self, context: &str) {
        if !self.save && self.report_url.is_none() {
            return;
        }
        let id = Uuid::new_v4();
        info!(%id, context, "capturing diagnostic report");
        let report = self.report(id, context);

        let save = self.save;
        let dir = self.dir.clone();
        let report_url = self.report_url.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            if save {
                let path = dir.join(format!("report-{id}.json"));
                let write = async {
                    tokio::fs::create_dir_all(&dir).await?;
                    tokio::fs::write(&path, report.to_string()).await
                };
                match write.await {
                    Ok(()) => debug!(path = %path.display(), "diagnostic report written"),
                    Err(e) => warn!(error = %e, "failed to write diagnostic report"),
                }
            }
            if let Some(url) = report_url {
                match client.post(&url).json(&report).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(%id, "diagnostic report submitted");
                    }
                    Ok(resp) => {
                        warn!(%id, status = %resp.status(), "report endpoint rejected submission");
                    }
                    Err(e) => warn!(%id, error = %e, "diagnostic report submission failed"),
                }
            }
        });
    }
}
