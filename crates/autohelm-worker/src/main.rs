use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use autohelm_arbiter::ResourceArbiter;
use autohelm_bridge::{BridgeClient, HttpBackendProbe};
use autohelm_core::{
    stop_channel, BackendProbe, Diagnostics, EmulatorControl, JobBody, NotifySink, ResourceReader,
    WorkerConfig,
};
use autohelm_notify::{DiagnosticSink, WebhookNotifier};
use autohelm_registry::JobRegistry;
use autohelm_runner::{EmulatorSupervisor, JobRunner};
use autohelm_worker::{ExitReason, Scheduler};

#[derive(Parser)]
#[command(name = "autohelm", version, about = "Prioritized single-instance job worker")]
struct Args {
    /// Config file path (falls back to $AUTOHELM_CONFIG, then ./autohelm.toml).
    #[arg(long)]
    config: Option<String>,

    /// Load and validate the config, print the initial schedule, exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autohelm=info".into()),
        )
        .init();

    let config = match WorkerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(JobRegistry::from_config(&config));
    if args.dry_run {
        println!("config ok; initial schedule:");
        for job in registry.snapshot() {
            println!(
                "  {:<10} {} next_run={}",
                job.id.to_string(),
                if job.enabled { "enabled " } else { "disabled" },
                job.next_run,
            );
        }
        return Ok(());
    }

    let bridge = Arc::new(BridgeClient::new(&config.bridge)?);
    let probe: Arc<dyn BackendProbe> = Arc::new(HttpBackendProbe::new(&config.backend)?);
    let notifier: Arc<dyn NotifySink> =
        Arc::new(WebhookNotifier::new(&config.notify, &config.worker));
    let diagnostics: Arc<dyn Diagnostics> = Arc::new(DiagnosticSink::new(
        &config.notify,
        &config.faults,
        &config.worker,
    ));

    let supervisor = EmulatorSupervisor::new(
        Arc::clone(&bridge) as Arc<dyn EmulatorControl>,
        config.emulator.clone(),
    );
    let runner = JobRunner::new(
        Arc::clone(&bridge) as Arc<dyn JobBody>,
        Arc::clone(&registry),
        Arc::clone(&probe),
        Arc::clone(&notifier),
        Arc::clone(&diagnostics),
    );
    let arbiter = ResourceArbiter::new(
        Arc::clone(&registry),
        Arc::clone(&bridge) as Arc<dyn ResourceReader>,
        Arc::clone(&notifier),
        config.arbiter.clone(),
    );

    let (stop_handle, stop_token) = stop_channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler failed");
            return;
        }
        info!("interrupt received, stopping after the current job");
        stop_handle.stop();
    });

    let mut scheduler = Scheduler::new(
        config,
        args.config,
        registry,
        runner,
        supervisor,
        arbiter,
        probe,
        notifier,
        diagnostics,
        stop_token,
    );

    match scheduler.run().await {
        ExitReason::Stopped => Ok(()),
        ExitReason::Fatal(reason) => {
            eprintln!("fatal: {reason}");
            std::process::exit(1);
        }
    }
}
