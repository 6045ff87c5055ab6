//! Workload trait

use async_trait::async_trait;

use crate::context::IterationContext;
use crate::error::IterationError;

/// A user-defined iteration: the steps one virtual user performs.
///
/// One workload value is shared by every iteration of a run; anything an
/// iteration mutates belongs in [`Workload::State`].
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Per-iteration state, created fresh for every iteration
    type State: Default + Send + 'static;

    /// Scenario name used in logs
    fn name(&self) -> &str;

    /// Run one iteration. Returning early with an error stops it at that
    /// step; later steps are never reached.
    async fn iteration(&self, ctx: &mut IterationContext<Self::State>) -> Result<(), IterationError>;
}
