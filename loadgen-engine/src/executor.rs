//! Runs single iterations and classifies their outcome

use loadgen_metrics::{MetricsError, MetricsRegistry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::context::IterationContext;
use crate::error::IterationError;
use crate::metrics::EngineMetrics;
use crate::workload::Workload;

/// How an iteration ended
#[derive(Debug)]
pub enum IterationOutcome {
    Completed,
    Failed(IterationError),
    /// A bounded wait ran out; incomplete, not an error
    TimedOut(IterationError),
}

impl IterationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, IterationOutcome::Completed)
    }
}

/// Result of one iteration, including its final state
#[derive(Debug)]
pub struct IterationReport<S> {
    pub id: u64,
    pub outcome: IterationOutcome,
    pub duration: Duration,
    pub state: S,
}

/// Runs iterations of one workload and records the built-in iteration
/// metrics. Shared by every task the scheduler spawns.
pub struct Executor<W: Workload> {
    workload: Arc<W>,
    metrics: MetricsRegistry,
    builtin: EngineMetrics,
    scenario: Arc<str>,
    next_id: AtomicU64,
    seed: Option<u64>,
}

impl<W: Workload> Executor<W> {
    pub fn new(workload: Arc<W>, metrics: MetricsRegistry) -> Result<Self, MetricsError> {
        let builtin = EngineMetrics::register(&metrics)?;
        let scenario = Arc::from(workload.name());
        Ok(Self {
            workload,
            metrics,
            builtin,
            scenario,
            next_id: AtomicU64::new(1),
            seed: None,
        })
    }

    /// Derive every iteration's RNG from `seed` for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn builtin(&self) -> &EngineMetrics {
        &self.builtin
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Allocate the next iteration id
    pub fn next_iteration_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run one iteration to completion or early return
    pub async fn run_iteration(&self) -> IterationReport<W::State> {
        let id = self.next_iteration_id();
        let span = info_span!("iteration", scenario = %self.scenario, id);
        self.run_with_id(id).instrument(span).await
    }

    async fn run_with_id(&self, id: u64) -> IterationReport<W::State> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id),
            None => StdRng::from_entropy(),
        };
        let mut ctx = IterationContext::new(
            id,
            self.scenario.clone(),
            self.metrics.clone(),
            rng,
            W::State::default(),
        );

        debug!("Iteration started");
        let result = self.workload.iteration(&mut ctx).await;
        let duration = ctx.elapsed();

        self.builtin.iterations.increment();
        self.builtin.iteration_duration.add_duration(duration);

        let outcome = match result {
            Ok(()) => {
                self.builtin.iteration_errors.add(false);
                debug!(elapsed_ms = duration.as_millis() as u64, "Iteration completed");
                IterationOutcome::Completed
            }
            Err(error) if error.is_timeout() => {
                self.builtin.iteration_errors.add(false);
                self.builtin.iterations_timed_out.increment();
                self.builtin.iterations_incomplete.increment();
                info!(step = error.step(), "Iteration incomplete: {}", error);
                IterationOutcome::TimedOut(error)
            }
            Err(error) => {
                self.builtin.iteration_errors.add(true);
                warn!(step = error.step(), "Iteration failed: {}", error);
                IterationOutcome::Failed(error)
            }
        };

        IterationReport {
            id,
            outcome,
            duration,
            state: ctx.into_state(),
        }
    }
}
