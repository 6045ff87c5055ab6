//! Run configuration for loadgen
//!
//! Configuration is split by functional domain. Each domain validates itself,
//! and the loader layers `LOADGEN_*` environment overrides on top of a YAML file.

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    fixtures::{FixtureSource, FixturesConfig},
    http::{HttpConfig, PoolConfig},
    logging::{LogFormat, LogLevel, LoggingConfig},
    metrics::MetricsConfig,
    reservation::{PaymentConfig, ReservationConfig},
    scenario::{ArrivalPlan, ConstantArrivalRate, OverflowPolicy, RampingVus, ScenarioConfig, Stage},
    target::TargetConfig,
    LoadConfig,
};
