//! Telemetry setup shared by dbsync binaries and tests.

pub mod tracing;
