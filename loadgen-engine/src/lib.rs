//! Load generation engine
//!
//! The pieces a load run is assembled from:
//!
//! - [`FixtureStore`]: read-only input pools, materialized once per run
//! - [`Workload`] and [`Executor`]: one virtual-user iteration, timed and
//!   classified into completed, failed or timed out
//! - [`InstrumentedClient`]: HTTP calls recorded into the built-in metrics
//! - [`select_excluding`] / [`acquire_with_exclusion`]: random selection that
//!   avoids previously rejected candidates
//! - [`Scheduler`]: issues iterations following an arrival plan and drains
//!   them on stop

pub mod context;
pub mod error;
pub mod executor;
pub mod fixtures;
pub mod instrumented;
pub mod metrics;
pub mod scheduler;
pub mod selection;
pub mod workload;

pub use context::{timed, IterationContext};
pub use error::{FixtureError, IterationError, SchedulerError};
pub use executor::{Executor, IterationOutcome, IterationReport};
pub use fixtures::{FixturePool, FixtureStore};
pub use instrumented::InstrumentedClient;
pub use metrics::EngineMetrics;
pub use scheduler::{target_vus_at, RunReport, Scheduler, StopHandle};
pub use selection::{acquire_with_exclusion, select_excluding, SelectionError};
pub use workload::Workload;
