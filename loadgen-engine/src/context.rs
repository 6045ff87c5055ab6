//! Per-iteration context

use loadgen_metrics::{MetricsRegistry, Trend};
use rand::rngs::StdRng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Everything one iteration owns. Never shared between iterations.
pub struct IterationContext<S> {
    id: u64,
    scenario: Arc<str>,
    metrics: MetricsRegistry,
    rng: StdRng,
    started: Instant,
    /// Workload-defined state carried between steps
    pub state: S,
}

impl<S> IterationContext<S> {
    pub fn new(id: u64, scenario: Arc<str>, metrics: MetricsRegistry, rng: StdRng, state: S) -> Self {
        Self {
            id,
            scenario,
            metrics,
            rng,
            started: Instant::now(),
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// State and RNG borrowed together, for steps that need both
    pub fn state_and_rng(&mut self) -> (&mut S, &mut StdRng) {
        (&mut self.state, &mut self.rng)
    }

    /// Time since the iteration started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Suspend this iteration only; other iterations keep running
    pub async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    pub fn into_state(self) -> S {
        self.state
    }
}

/// Await `fut` and record how long it took into `trend`
pub async fn timed<F: Future>(trend: &Trend, fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = fut.await;
    let elapsed = start.elapsed();
    trend.add_duration(elapsed);
    (output, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[tokio::test(start_paused = true)]
    async fn timed_records_elapsed() {
        let metrics = MetricsRegistry::new();
        let trend = metrics.time_trend("schedule_time").unwrap();

        let (value, elapsed) = timed(&trend, async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            42
        })
        .await;

        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_millis(150));
        let summary = metrics.summary();
        let schedule = summary.trend("schedule_time").unwrap();
        assert_eq!(schedule.count, 1);
        assert!(schedule.max >= 150.0);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_iteration_clock() {
        let ctx = IterationContext::new(
            7,
            Arc::from("test"),
            MetricsRegistry::new(),
            StdRng::seed_from_u64(1),
            (),
        );
        ctx.sleep(Duration::from_secs(3)).await;
        assert!(ctx.elapsed() >= Duration::from_secs(3));
        assert_eq!(ctx.id(), 7);
        assert_eq!(ctx.scenario(), "test");
    }
}
