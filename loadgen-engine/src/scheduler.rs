//! Arrival scheduling
//!
//! Two plans are supported. A constant arrival rate starts iterations on an
//! absolute timeline (`start + n * time_unit / rate`) so late wake-ups do not
//! erode the long-run rate, bounded by a pool of execution slots. Ramping
//! virtual users keep a number of looping workers that follows the stage
//! targets. Either way, once issuance stops queued arrivals are dropped and
//! in-flight iterations get `graceful_stop` to finish before they are aborted.

use loadgen_config::{ArrivalPlan, ConstantArrivalRate, OverflowPolicy, RampingVus, ScenarioConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::executor::Executor;
use crate::metrics::EngineMetrics;
use crate::workload::Workload;

/// How often the ramping controller re-evaluates the target VU count
const RAMP_TICK: Duration = Duration::from_millis(100);

/// Signals a running scheduler to stop issuing iterations
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub elapsed: Duration,
    /// Iterations that were started
    pub started: u64,
    /// Arrivals that found no slot or queue space
    pub dropped: u64,
    /// Iterations aborted after the grace period
    pub interrupted: u64,
    /// Issuance ended by an operator stop rather than the plan running out
    pub stopped_early: bool,
}

/// Run-wide counts shared with every spawned task
#[derive(Debug, Default)]
struct Tally {
    started: AtomicU64,
    dropped: AtomicU64,
    interrupted: AtomicU64,
}

/// Held while an iteration runs. Dropped without [`InFlight::finish`] the
/// iteration was aborted part-way.
struct InFlight<'a> {
    tally: &'a Tally,
    metrics: &'a EngineMetrics,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn start(tally: &'a Tally, metrics: &'a EngineMetrics) -> Self {
        tally.started.fetch_add(1, Ordering::Relaxed);
        Self {
            tally,
            metrics,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tally.interrupted.fetch_add(1, Ordering::Relaxed);
            self.metrics.iterations_interrupted.increment();
            self.metrics.iterations_incomplete.increment();
        }
    }
}

/// Held by an arrival waiting for a slot. Counts as dropped unless admitted.
struct Queued<'a> {
    tally: &'a Tally,
    metrics: &'a EngineMetrics,
    depth: &'a AtomicUsize,
    admitted: bool,
}

impl Queued<'_> {
    fn admit(mut self) {
        self.admitted = true;
    }
}

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        if !self.admitted {
            self.tally.dropped.fetch_add(1, Ordering::Relaxed);
            self.metrics.dropped_iterations.increment();
        }
    }
}

/// Issues iterations of one executor following an arrival plan
pub struct Scheduler<W: Workload> {
    executor: Arc<Executor<W>>,
    plan: ArrivalPlan,
    graceful_stop: Duration,
    stop_tx: Arc<watch::Sender<bool>>,
    tally: Arc<Tally>,
}

impl<W: Workload> Scheduler<W> {
    pub fn new(executor: Arc<Executor<W>>, scenario: &ScenarioConfig) -> Result<Self, SchedulerError> {
        match &scenario.arrival {
            ArrivalPlan::ConstantArrivalRate(plan) => {
                if plan.rate == 0 || plan.time_unit.is_zero() {
                    return Err(SchedulerError::InvalidPlan(
                        "rate and time_unit must be positive".to_string(),
                    ));
                }
                if plan.pre_allocated_vus == 0 {
                    return Err(SchedulerError::InvalidPlan(
                        "pre_allocated_vus must be positive".to_string(),
                    ));
                }
            }
            ArrivalPlan::RampingVus(plan) => {
                if plan.stages.is_empty() {
                    return Err(SchedulerError::InvalidPlan(
                        "ramping-vus needs at least one stage".to_string(),
                    ));
                }
            }
        }

        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            executor,
            plan: scenario.arrival.clone(),
            graceful_stop: scenario.graceful_stop,
            stop_tx: Arc::new(stop_tx),
            tally: Arc::new(Tally::default()),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Iterations started so far
    pub fn started(&self) -> u64 {
        self.tally.started.load(Ordering::Relaxed)
    }

    /// Run the plan to completion, or until stopped, then drain
    pub async fn run(&self) -> RunReport {
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        let mut stop = self.stop_tx.subscribe();

        info!(
            executor = self.plan.executor_name(),
            scenario = self.executor.scenario(),
            "Starting arrivals for {:?}",
            self.plan.issuance_duration()
        );

        let stopped_early = match &self.plan {
            ArrivalPlan::ConstantArrivalRate(plan) => {
                self.issue_constant_rate(plan, start, &mut tasks, &mut stop).await
            }
            ArrivalPlan::RampingVus(plan) => self.issue_ramping(plan, start, &mut tasks, &mut stop).await,
        };

        if stopped_early {
            info!("Stop requested, no new iterations will start");
        }
        self.drain(&mut tasks).await;

        let report = RunReport {
            elapsed: start.elapsed(),
            started: self.started(),
            dropped: self.tally.dropped.load(Ordering::Relaxed),
            interrupted: self.tally.interrupted.load(Ordering::Relaxed),
            stopped_early,
        };
        info!(
            started = report.started,
            dropped = report.dropped,
            interrupted = report.interrupted,
            "Run finished in {:?}",
            report.elapsed
        );
        report
    }

    /// Returns whether issuance was ended by a stop request
    async fn issue_constant_rate(
        &self,
        plan: &ConstantArrivalRate,
        start: Instant,
        tasks: &mut JoinSet<()>,
        stop: &mut watch::Receiver<bool>,
    ) -> bool {
        let slots = Arc::new(Semaphore::new(plan.pre_allocated_vus));
        let issuing = Arc::new(AtomicBool::new(true));
        let queued = Arc::new(AtomicUsize::new(0));
        let mut arrival: u64 = 0;

        let stopped_early = loop {
            if *stop.borrow() {
                break true;
            }
            // past the last arrival, keep reaping until the duration is up
            let offset = arrival_offset(plan, arrival);
            let due = offset < plan.duration;
            let wake = start + if due { offset } else { plan.duration };

            tokio::select! {
                _ = sleep_until(wake) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break true;
                    }
                    continue;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(result);
                    continue;
                }
            }
            if !due {
                break false;
            }
            arrival += 1;

            if let Ok(permit) = slots.clone().try_acquire_owned() {
                let executor = self.executor.clone();
                let tally = self.tally.clone();
                tasks.spawn(async move {
                    let in_flight = InFlight::start(&tally, executor.builtin());
                    executor.run_iteration().await;
                    in_flight.finish();
                    drop(permit);
                });
                continue;
            }

            match plan.overflow {
                OverflowPolicy::Queue { max_queued } if queued.load(Ordering::SeqCst) < max_queued => {
                    queued.fetch_add(1, Ordering::SeqCst);
                    let executor = self.executor.clone();
                    let tally = self.tally.clone();
                    let slots = slots.clone();
                    let issuing = issuing.clone();
                    let queued = queued.clone();
                    tasks.spawn(async move {
                        let waiting = Queued {
                            tally: &tally,
                            metrics: executor.builtin(),
                            depth: &queued,
                            admitted: false,
                        };
                        // closed once issuance ends
                        let Ok(permit) = slots.acquire_owned().await else {
                            return;
                        };
                        if !issuing.load(Ordering::SeqCst) {
                            return;
                        }
                        waiting.admit();
                        let in_flight = InFlight::start(&tally, executor.builtin());
                        executor.run_iteration().await;
                        in_flight.finish();
                        drop(permit);
                    });
                    debug!(arrival, "All slots busy, arrival queued");
                }
                _ => {
                    self.tally.dropped.fetch_add(1, Ordering::Relaxed);
                    self.executor.builtin().dropped_iterations.increment();
                    debug!(arrival, "All slots busy, arrival dropped");
                }
            }
        };

        issuing.store(false, Ordering::SeqCst);
        slots.close();
        let waiting = queued.load(Ordering::SeqCst);
        if waiting > 0 {
            debug!(waiting, "Issuance over, dropping queued arrivals");
        }
        stopped_early
    }

    async fn issue_ramping(
        &self,
        plan: &RampingVus,
        start: Instant,
        tasks: &mut JoinSet<()>,
        stop: &mut watch::Receiver<bool>,
    ) -> bool {
        let total = plan.stages.iter().map(|stage| stage.duration).sum::<Duration>();
        let mut vus: Vec<Arc<AtomicBool>> = Vec::new();
        let mut ticker = tokio::time::interval(RAMP_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stopped_early = loop {
            if *stop.borrow() {
                break true;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break true;
                    }
                    continue;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(result);
                    continue;
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= total {
                break false;
            }

            let target = target_vus_at(plan, elapsed);
            if target != vus.len() {
                debug!(from = vus.len(), to = target, "Adjusting virtual users");
            }
            while vus.len() < target {
                let running = Arc::new(AtomicBool::new(true));
                vus.push(running.clone());
                let executor = self.executor.clone();
                let tally = self.tally.clone();
                tasks.spawn(async move {
                    while running.load(Ordering::SeqCst) {
                        let in_flight = InFlight::start(&tally, executor.builtin());
                        executor.run_iteration().await;
                        in_flight.finish();
                        // an iteration that never suspends must not starve the controller
                        tokio::task::yield_now().await;
                    }
                });
            }
            while vus.len() > target {
                // finishes its current iteration, then exits
                if let Some(running) = vus.pop() {
                    running.store(false, Ordering::SeqCst);
                }
            }
        };

        for running in &vus {
            running.store(false, Ordering::SeqCst);
        }
        stopped_early
    }

    /// Wait up to `graceful_stop` for in-flight tasks, abort the rest.
    /// Aborted iterations are counted by their [`InFlight`] guards.
    async fn drain(&self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        debug!(tasks = tasks.len(), "Draining in-flight iterations");

        let drained = tokio::time::timeout(self.graceful_stop, async {
            while let Some(result) = tasks.join_next().await {
                reap(result);
            }
        })
        .await;
        if drained.is_ok() {
            return;
        }

        warn!(
            remaining = tasks.len(),
            "Graceful stop of {:?} expired, interrupting iterations", self.graceful_stop
        );
        tasks.abort_all();
        while let Some(result) = tasks.join_next().await {
            reap(result);
        }
    }
}

/// Offset of the `n`-th arrival from the start of the run
fn arrival_offset(plan: &ConstantArrivalRate, n: u64) -> Duration {
    let nanos = plan.time_unit.as_nanos() * n as u128 / plan.rate.max(1) as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Target number of virtual users `elapsed` into a ramping plan, moving
/// linearly from the previous stage's target to the current one
pub fn target_vus_at(plan: &RampingVus, elapsed: Duration) -> usize {
    let mut stage_start = Duration::ZERO;
    let mut previous = plan.start_vus;
    for stage in &plan.stages {
        if elapsed < stage_start + stage.duration {
            let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let diff = stage.target as f64 - previous as f64;
            return (previous as f64 + diff * progress) as usize;
        }
        stage_start += stage.duration;
        previous = stage.target;
    }
    previous
}

fn reap(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Iteration task panicked: {}", e);
        }
    }
}
