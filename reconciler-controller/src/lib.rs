//! Lifecycle of a reconciler controller: serve gRPC, register the instance
//! with service discovery, and unwind both on shutdown.

pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod options;
pub mod server;

pub use controller::ReconcilerController;
pub use error::{ControllerError, LifecycleState};
pub use identity::Identity;
pub use options::Options;
pub use server::{GrpcServer, RunningServer, ServerError};
