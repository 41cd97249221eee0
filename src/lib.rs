pub mod cluster;
pub mod config;
pub mod controller;
pub mod model;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export for main.rs and the health job
pub use crate::controller::{Reconciler, ReconcileError, StatusReporter};
