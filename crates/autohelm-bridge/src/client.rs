use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use autohelm_core::config::BridgeSection;
use autohelm_core::{
    EmulatorControl, Gauge, JobBody, JobFault, JobId, JobOutcome, ResourceReader,
};

/// HTTP client for the local automation agent.
///
/// The agent owns everything pixel-shaped; this client only moves the
/// already-classified results across the process boundary. Transport-level
/// failures are classified here: a refused or timed-out connection means
/// the emulator host is gone, a malformed response is a contract
/// violation.
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
}

/// Wire form of one job invocation result.
#[derive(Debug, Deserialize)]
struct RunResponse {
    outcome: String,
    fault: Option<FaultBody>,
}

#[derive(Debug, Deserialize)]
struct FaultBody {
    kind: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct GaugeResponse {
    value: i64,
}

impl BridgeClient {
    pub fn new(config: &BridgeSection) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn transport_fault(e: reqwest::Error) -> JobFault {
    if e.is_connect() || e.is_timeout() {
        JobFault::EmulatorOffline
    } else {
        JobFault::Unexpected(e.into())
    }
}

fn decode_fault(body: FaultBody) -> JobFault {
    match body.kind.as_str() {
        "app_not_running" => JobFault::AppNotRunning,
        "app_stuck" => JobFault::AppStuck(body.detail),
        "app_glitch" => JobFault::AppGlitch(body.detail),
        "backend_suspect" => JobFault::BackendSuspect,
        "emulator_offline" => JobFault::EmulatorOffline,
        "contract" => JobFault::Contract(body.detail),
        // Anything else the agent already judged unrecoverable for this
        // job; carry its classification through.
        _ => JobFault::Failed {
            kind: body.kind,
            detail: body.detail,
        },
    }
}

#[async_trait]
impl JobBody for BridgeClient {
    async fn invoke(&self, id: JobId) -> Result<JobOutcome, JobFault> {
        let url = self.url(&format!("/jobs/{id}/run"));
        debug!(job = %id, "invoking job via bridge");
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(transport_fault)?;
        if !resp.status().is_success() {
            return Err(JobFault::Contract(format!(
                "bridge returned {} for `{id}`",
                resp.status()
            )));
        }
        let run: RunResponse = resp
            .json()
            .await
            .map_err(|e| JobFault::Contract(format!("malformed bridge response: {e}")))?;
        match run.outcome.as_str() {
            "done" => Ok(JobOutcome::Done),
            "no_work" => Ok(JobOutcome::NoWork),
            "fault" => Err(run
                .fault
                .map(decode_fault)
                .unwrap_or_else(|| JobFault::Contract("fault outcome without a fault body".into()))),
            other => Err(JobFault::Contract(format!("unknown outcome `{other}`"))),
        }
    }
}

#[async_trait]
impl EmulatorControl for BridgeClient {
    async fn stop(&self) -> anyhow::Result<()> {
        self.client
            .post(self.url("/emulator/stop"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.client
            .post(self.url("/emulator/start"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ResourceReader for BridgeClient {
    async fn read(&self, gauge: Gauge) -> anyhow::Result<i64> {
        let resp: GaugeResponse = self
            .client
            .get(self.url(&format!("/gauges/{gauge}")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(%gauge, value = resp.value, "gauge read");
        Ok(resp.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BridgeClient {
        BridgeClient::new(&BridgeSection {
            base_url: base.into(),
            ..BridgeSection::default()
        })
        .unwrap()
    }

    #[test]
    fn urls_join_without_doubled_slashes() {
        let c = client("http://127.0.0.1:7912/");
        assert_eq!(
            c.url("/jobs/leveling/run"),
            "http://127.0.0.1:7912/jobs/leveling/run"
        );
    }

    #[test]
    fn known_fault_kinds_decode_to_their_variants() {
        let decode = |kind: &str, detail: &str| {
            decode_fault(FaultBody {
                kind: kind.into(),
                detail: detail.into(),
            })
        };
        assert!(matches!(decode("app_not_running", ""), JobFault::AppNotRunning));
        assert!(matches!(decode("app_stuck", "combat"), JobFault::AppStuck(d) if d == "combat"));
        assert!(matches!(decode("app_glitch", ""), JobFault::AppGlitch(_)));
        assert!(matches!(decode("backend_suspect", ""), JobFault::BackendSuspect));
        assert!(matches!(decode("emulator_offline", ""), JobFault::EmulatorOffline));
        assert!(matches!(decode("contract", "bad map"), JobFault::Contract(d) if d == "bad map"));
    }

    #[test]
    fn unknown_fault_kind_stays_a_classified_failure() {
        let fault = decode_fault(FaultBody {
            kind: "ui".into(),
            detail: "button not found".into(),
        });
        assert!(matches!(
            fault,
            JobFault::Failed { kind, detail } if kind == "ui" && detail == "button not found"
        ));
    }

    #[test]
    fn run_response_decodes_with_and_without_fault() {
        let run: RunResponse = serde_json::from_str(r#"{"outcome":"done"}"#).unwrap();
        assert_eq!(run.outcome, "done");
        assert!(run.fault.is_none());

        let run: RunResponse = serde_json::from_str(
            r#"{"outcome":"fault","fault":{"kind":"app_stuck","detail":"combat loop"}}"#,
        )
        .unwrap();
        let fault = run.fault.unwrap();
        assert_eq!(fault.kind, "app_stuck");
        assert_eq!(fault.detail, "combat loop");
    }

    // Refused connections classify as the emulator-offline fault class.
    #[tokio::test]
    async fn refused_connection_classifies_as_offline() {
        let c = client("http://127.0.0.1:1");
        let err = c.invoke(JobId::Salvage).await.unwrap_err();
        assert!(matches!(err, JobFault::EmulatorOffline));
    }
}
