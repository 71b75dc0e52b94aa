//! Liveness tracking for the reconciler controller.
//!
//! [`HealthRegistry`] collects heartbeats from the long-running parts of the
//! process, and [`HealthMonitor`] turns the registry into the two callbacks a
//! discovery backend probes: a single-shot [`HealthMonitor::check`] and a
//! streaming [`HealthMonitor::watch`].

mod monitor;
mod registry;

pub use monitor::{HealthMonitor, ServingStatus, DEFAULT_POLL_INTERVAL};
pub use registry::{ComponentStatus, HealthHandle, HealthRegistry, HealthStatus};
