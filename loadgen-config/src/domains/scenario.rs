//! Scenario and arrival plan configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scenario configuration: what to call the run and how iterations arrive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Scenario name, used as a log and metric label
    pub name: String,

    /// How iterations are scheduled
    pub arrival: ArrivalPlan,

    /// How long in-flight iterations may keep running once issuance stops
    #[serde(with = "humantime_serde")]
    pub graceful_stop: Duration,
}

/// Arrival plan, mirroring the two executors the scenario can be driven by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ArrivalPlan {
    /// Start iterations at a fixed rate regardless of how long they take
    ConstantArrivalRate(ConstantArrivalRate),

    /// Keep a number of looping virtual users that follows ramp stages
    RampingVus(RampingVus),
}

/// Constant arrival rate plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantArrivalRate {
    /// Iterations started per `time_unit`
    pub rate: u32,

    #[serde(with = "humantime_serde", default = "default_time_unit")]
    pub time_unit: Duration,

    /// How long new iterations are issued
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Size of the execution slot pool
    pub pre_allocated_vus: usize,

    /// What to do with an arrival when every slot is busy
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

/// Ramping virtual users plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampingVus {
    /// Virtual users running at time zero
    #[serde(default)]
    pub start_vus: usize,

    /// Ramp stages, each interpolating linearly from the previous target
    pub stages: Vec<Stage>,
}

/// One ramp stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Virtual user count reached at the end of the stage
    pub target: usize,
}

/// Policy for arrivals that find no free execution slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip the arrival and count it in `dropped_iterations`
    #[default]
    Drop,

    /// Hold the arrival until a slot frees up; arrivals beyond `max_queued`
    /// waiting at once are dropped
    Queue { max_queued: usize },
}

impl ArrivalPlan {
    /// Total time during which new iterations are issued
    pub fn issuance_duration(&self) -> Duration {
        match self {
            ArrivalPlan::ConstantArrivalRate(plan) => plan.duration,
            ArrivalPlan::RampingVus(plan) => plan.stages.iter().map(|s| s.duration).sum(),
        }
    }

    /// Executor name as written in configuration
    pub fn executor_name(&self) -> &'static str {
        match self {
            ArrivalPlan::ConstantArrivalRate(_) => "constant-arrival-rate",
            ArrivalPlan::RampingVus(_) => "ramping-vus",
        }
    }
}

impl ConstantArrivalRate {
    /// Gap between consecutive iteration starts
    pub fn interval(&self) -> Duration {
        self.time_unit / self.rate.max(1)
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "ticket_reservation".to_string(),
            arrival: ArrivalPlan::default(),
            graceful_stop: default_graceful_stop(),
        }
    }
}

impl Default for ArrivalPlan {
    fn default() -> Self {
        ArrivalPlan::ConstantArrivalRate(ConstantArrivalRate {
            rate: 10,
            time_unit: default_time_unit(),
            duration: Duration::from_secs(15),
            pre_allocated_vus: 10,
            overflow: OverflowPolicy::Drop,
        })
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        self.arrival.validate()
    }

    fn domain_name(&self) -> &'static str {
        "scenario"
    }
}

impl Validatable for ArrivalPlan {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        match self {
            ArrivalPlan::ConstantArrivalRate(plan) => {
                validate_positive(plan.rate, "rate", domain)?;
                validate_duration(plan.time_unit, "time_unit", domain)?;
                validate_duration(plan.duration, "duration", domain)?;
                validate_positive(plan.pre_allocated_vus, "pre_allocated_vus", domain)?;
                if let OverflowPolicy::Queue { max_queued } = plan.overflow {
                    validate_positive(max_queued, "overflow.max_queued", domain)?;
                }
            }
            ArrivalPlan::RampingVus(plan) => {
                if plan.stages.is_empty() {
                    return Err(self.validation_error("ramping-vus requires at least one stage"));
                }
                for (index, stage) in plan.stages.iter().enumerate() {
                    validate_duration(stage.duration, &format!("stages[{}].duration", index), domain)?;
                }
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenario.arrival"
    }
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}
