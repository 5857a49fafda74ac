use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use autohelm_core::config::{NotifySection, WorkerSection};
use autohelm_core::NotifySink;

/// Pushes notifications to a JSON webhook.
///
/// Delivery runs on a spawned task so a slow or dead endpoint never stalls
/// the scheduler loop.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    instance: String,
    enabled: bool,
}

impl WebhookNotifier {
    pub fn new(notify: &NotifySection, worker: &WorkerSection) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            webhook_url: notify.webhook_url.clone(),
            instance: worker.instance.clone(),
            enabled: notify.enabled,
        }
    }

    fn payload(&self, title: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "instance": self.instance,
            "title": format!("[autohelm {}] {title}", self.instance),
            "content": content,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

impl NotifySink for WebhookNotifier {
    fn notify(&self, title: &str, content: &str) {
        if !self.enabled {
            return;
        }
        let Some(url) = self.webhook_url.clone() else {
            debug!(title, "no webhook configured, dropping notification");
            return;
        };
        let body = self.payload(title, content);
        let client = self.client.clone();
        let title = title.to_string();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(title, "notification delivered");
                }
                Ok(resp) => {
                    warn!(title, status = %resp.status(), "webhook rejected notification");
                }
                Err(e) => {
                    warn!(title, error = %e, "webhook delivery failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(url: Option<&str>, enabled: bool) -> WebhookNotifier {
        let notify = NotifySection {
            webhook_url: url.map(String::from),
            enabled,
            ..NotifySection::default()
        };
        let worker = WorkerSection {
            instance: "alpha".into(),
            ..WorkerSection::default()
        };
        WebhookNotifier::new(&notify, &worker)
    }

    #[test]
    fn payload_carries_the_instance_prefix() {
        let n = notifier(Some("http://localhost/hook"), true);
        let body = n.payload("app stuck", "details");
        assert_eq!(body["title"], "[autohelm alpha] app stuck");
        assert_eq!(body["instance"], "alpha");
        assert_eq!(body["content"], "details");
    }

    // Disabled and unconfigured sinks return before spawning, so no
    // runtime is needed here.
    #[test]
    fn disabled_sink_is_a_no_op() {
        notifier(Some("http://localhost/hook"), false).notify("t", "c");
        notifier(None, true).notify("t", "c");
    }
}
