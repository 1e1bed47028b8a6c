pub mod context;
pub mod core;
pub mod metrics;
pub(crate) mod pacemaker;
pub mod plugin;
pub mod plugins;

pub use context::DriverContext;
pub use core::TaskDriver;
pub use metrics::DriverMetrics;
pub(crate) use pacemaker::PacemakerEvent;
pub use plugin::DriverPlugin;
pub use plugins::MetricsPlugin;
