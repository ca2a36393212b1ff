//! Compute Permit Sim - regulated compute-permit market simulation
//!
//! Labs bid for a capped supply of training permits, decide whether to run
//! without one, and face a regulator that audits and penalises violations.

pub mod core;
pub mod enforcement;
pub mod lab;
pub mod market;
pub mod simulation;
