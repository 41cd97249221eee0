//! Request descriptors and the naming convention for managed objects

pub mod application;

pub use application::{ApplicationConfig, ResourceUpdateConfig, ValidationError};
