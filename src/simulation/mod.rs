//! Simulation: the per-step orchestrator and the run driver around it

pub mod output;
pub mod population;
pub mod runner;
pub mod step;

pub use output::{LabSnapshot, RunMetrics, SimulationOutput, StepRecord};
pub use population::generate_labs;
pub use runner::{build_market, simulate, Simulation};
pub use step::{classify_usage, execute_step, AgentOutcome, StepOutcome, UsageClass};
