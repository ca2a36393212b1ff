//! Simulation output and serialization

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::ScenarioConfig;
use crate::core::error::Result;
use crate::core::types::{LabId, Step};
use crate::simulation::step::UsageClass;

/// Complete simulation output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub config: ScenarioConfig,
    /// Seed actually used, whether configured or drawn
    pub seed: u64,
    pub steps: Vec<StepRecord>,
    pub metrics: RunMetrics,
    pub simulation_time_ms: u64,
}

/// Market, enforcement and per-lab state after one step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub clearing_price: f64,
    pub supply: u64,
    pub permits_allocated: u64,
    pub compliance_rate: f64,
    pub violations: usize,
    pub audits_triggered: usize,
    pub audits_performed: usize,
    pub catches: usize,
    pub labs: Vec<LabSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabSnapshot {
    pub lab_id: LabId,
    pub permits: u64,
    pub compliant: bool,
    pub usage: UsageClass,
    pub audited: bool,
    pub caught: bool,
    pub false_positive: bool,
    pub penalty: f64,
    pub wealth: f64,
    pub audit_coefficient: f64,
    pub reputation_sensitivity: f64,
    pub racing_factor: f64,
    pub cumulative_capability: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub steps_simulated: u32,
    pub final_compliance_rate: f64,
    pub final_clearing_price: f64,
    /// Mean per-step compliance rate
    pub deterrence_success_rate: f64,
    pub total_violations: usize,
    pub total_audits: usize,
    pub total_catches: usize,
    pub total_penalties: f64,
    /// Audits performed times the per-audit cost
    pub enforcement_cost: f64,
    /// None when no lab ended the run in that group
    pub mean_wealth_compliant: Option<f64>,
    pub mean_wealth_non_compliant: Option<f64>,
}

impl RunMetrics {
    /// Aggregate per-step records into run metrics
    pub fn from_records(records: &[StepRecord], audit_cost: f64) -> Self {
        let Some(last) = records.last() else {
            return Self::default();
        };

        let total_audits: usize = records.iter().map(|r| r.audits_performed).sum();
        let total_penalties: f64 = records
            .iter()
            .flat_map(|r| r.labs.iter())
            .map(|l| l.penalty)
            .sum();

        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        };
        let (compliant, non_compliant): (Vec<&LabSnapshot>, Vec<&LabSnapshot>) =
            last.labs.iter().partition(|l| l.compliant);

        Self {
            steps_simulated: records.len() as u32,
            final_compliance_rate: last.compliance_rate,
            final_clearing_price: last.clearing_price,
            deterrence_success_rate: records.iter().map(|r| r.compliance_rate).sum::<f64>()
                / records.len() as f64,
            total_violations: records.iter().map(|r| r.violations).sum(),
            total_audits,
            total_catches: records.iter().map(|r| r.catches).sum(),
            total_penalties,
            enforcement_cost: total_audits as f64 * audit_cost,
            mean_wealth_compliant: mean(compliant.iter().map(|l| l.wealth).collect()),
            mean_wealth_non_compliant: mean(non_compliant.iter().map(|l| l.wealth).collect()),
        }
    }
}

impl SimulationOutput {
    pub fn new(config: ScenarioConfig, seed: u64, steps: Vec<StepRecord>, elapsed: Duration) -> Self {
        let metrics = RunMetrics::from_records(&steps, config.audit.audit_cost);
        Self {
            config,
            seed,
            steps,
            metrics,
            simulation_time_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        let m = &self.metrics;
        let wealth = |w: Option<f64>| w.map_or_else(|| "n/a".to_string(), |w| format!("{w:.1}"));
        format!(
            "Simulated {} steps with {} labs (seed {}) in {}ms\n\
             Final price {:.2}, final compliance {:.1}%, deterrence {:.1}%\n\
             {} violations, {} audits, {} catches, penalties {:.1}, enforcement cost {:.1}\n\
             Mean wealth: compliant {}, non-compliant {}",
            m.steps_simulated,
            self.config.n_agents,
            self.seed,
            self.simulation_time_ms,
            m.final_clearing_price,
            m.final_compliance_rate * 100.0,
            m.deterrence_success_rate * 100.0,
            m.total_violations,
            m.total_audits,
            m.total_catches,
            m.total_penalties,
            m.enforcement_cost,
            wealth(m.mean_wealth_compliant),
            wealth(m.mean_wealth_non_compliant),
        )
    }
}
