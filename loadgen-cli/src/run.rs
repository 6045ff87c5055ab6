//! Wiring a configuration into a running scenario

use anyhow::{Context, Result};
use loadgen_config::LoadConfig;
use loadgen_engine::{Executor, RunReport, Scheduler};
use loadgen_metrics::{MetricsRegistry, RunSummary, ThresholdReport, ThresholdSet};
use loadgen_reservation::ReservationScenario;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::report::live_snapshot;

/// Everything known about a finished run
#[derive(Debug)]
pub struct RunOutcome {
    pub run: RunReport,
    pub summary: RunSummary,
    pub thresholds: ThresholdReport,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.thresholds.passed()
    }
}

/// Check everything a run would need before any request is sent
pub fn preflight(config: &LoadConfig) -> Result<ThresholdSet> {
    let thresholds = ThresholdSet::parse(&config.thresholds).context("Invalid threshold expression")?;
    ReservationScenario::from_config(config, &MetricsRegistry::new())
        .context("Failed to set up reservation workload")?;
    Ok(thresholds)
}

/// Run the configured scenario to completion or until interrupted
pub async fn execute(config: &LoadConfig) -> Result<RunOutcome> {
    let thresholds = ThresholdSet::parse(&config.thresholds).context("Invalid threshold expression")?;
    let registry = MetricsRegistry::with_sample_bound(config.metrics.max_samples_per_metric);

    let scenario = ReservationScenario::from_config(config, &registry)
        .context("Failed to set up reservation workload")?;
    let executor = Arc::new(Executor::new(Arc::new(scenario), registry.clone())?);
    let scheduler = Scheduler::new(executor, &config.scenario).context("Invalid arrival plan")?;

    let stop = scheduler.stop_handle();
    let interrupt = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping arrivals and draining in-flight iterations");
            stop.stop();
        }
    });
    let reporter = config
        .metrics
        .report_interval
        .map(|period| spawn_reporter(registry.clone(), period));

    info!(
        scenario = %config.scenario.name,
        target = %config.target.base_url,
        thresholds = thresholds.len(),
        "Starting run"
    );
    let run = scheduler.run().await;

    interrupt.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    let summary = registry.summary();
    let thresholds = thresholds.evaluate(&summary);
    info!(
        started = run.started,
        dropped = run.dropped,
        interrupted = run.interrupted,
        thresholds_passed = thresholds.passed(),
        "Run finished"
    );

    Ok(RunOutcome {
        run,
        summary,
        thresholds,
    })
}

fn spawn_reporter(registry: MetricsRegistry, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("{}", live_snapshot(&registry.summary()));
        }
    })
}

/// Write the run outcome as JSON
pub fn write_summary_json(path: &Path, outcome: &RunOutcome) -> Result<()> {
    let document = serde_json::json!({
        "run": {
            "finished_at": chrono::Utc::now().to_rfc3339(),
            "elapsed_ms": outcome.run.elapsed.as_millis() as u64,
            "started": outcome.run.started,
            "dropped": outcome.run.dropped,
            "interrupted": outcome.run.interrupted,
            "stopped_early": outcome.run.stopped_early,
        },
        "metrics": outcome.summary,
        "thresholds": outcome.thresholds,
        "passed": outcome.passed(),
    });
    let content = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    Ok(())
}
