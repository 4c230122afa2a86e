//! Coordination primitives shared by the stages of a run.

pub mod shutdown;
