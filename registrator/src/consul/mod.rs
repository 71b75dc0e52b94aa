//! Consul agent integration: the service is enrolled with a TTL check that the
//! registrator keeps renewing, and optionally a gRPC check the agent runs itself.

mod client;
mod registrator;

pub use client::{AgentServiceCheck, AgentServiceRegistration, CheckStatus, ConsulApi, HttpConsulClient};
pub use registrator::ConsulRegistrator;
