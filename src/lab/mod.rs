//! Labs: the regulated firms
//!
//! A lab carries three layers of state:
//! - [`LabParams`]: fixed at creation, never mutated
//! - [`StepState`]: permits, collateral and the latest decision, reset each step
//! - [`DynamicState`]: escalation, reputation and racing, carried across steps
//!
//! All three are read through accessors. Step state changes only through
//! `begin_step`, permit assignment, the compliance decision and collateral
//! posting/release.

mod decision;
mod dynamics;

use serde::{Deserialize, Serialize};

use crate::core::config::LabGenerationConfig;
use crate::core::error::{ensure_non_negative, ensure_positive, Result};
use crate::core::types::LabId;
use crate::market::Bid;

/// Static parameters of one lab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabParams {
    /// Value of one training run (v_i)
    pub economic_value: f64,
    /// Multiplier on perceived sanctions
    pub risk_profile: f64,
    /// Planned training compute (FLOP)
    pub planned_usage: f64,
    /// Flat penalty charged when caught
    pub penalty_amount: f64,
    /// Revenue used by percentage penalties
    pub firm_revenue: f64,
    /// Baseline capability value gained by running (V_b)
    pub capability_value: f64,
    pub base_racing_factor: f64,
    pub base_reputation_sensitivity: f64,
    pub base_audit_coefficient: f64,
    pub reputation_escalation_factor: f64,
    pub racing_gap_sensitivity: f64,
    pub capability_scale: f64,
}

impl LabParams {
    /// Combine per-lab draws with the shared generation config
    pub fn from_config(
        config: &LabGenerationConfig,
        penalty_amount: f64,
        economic_value: f64,
        risk_profile: f64,
        planned_usage: f64,
        firm_revenue: f64,
    ) -> Self {
        Self {
            economic_value,
            risk_profile,
            planned_usage,
            penalty_amount,
            firm_revenue,
            capability_value: config.capability_value,
            base_racing_factor: config.racing_factor,
            base_reputation_sensitivity: config.reputation_sensitivity,
            base_audit_coefficient: config.audit_coefficient,
            reputation_escalation_factor: config.reputation_escalation_factor,
            racing_gap_sensitivity: config.racing_gap_sensitivity,
            capability_scale: config.capability_scale,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("lab.planned_usage", self.planned_usage)?;
        ensure_non_negative("lab.economic_value", self.economic_value)?;
        ensure_non_negative("lab.risk_profile", self.risk_profile)?;
        ensure_non_negative("lab.penalty_amount", self.penalty_amount)?;
        ensure_non_negative("lab.firm_revenue", self.firm_revenue)?;
        ensure_non_negative("lab.capability_value", self.capability_value)?;
        ensure_non_negative("lab.racing_factor", self.base_racing_factor)?;
        ensure_non_negative("lab.reputation_sensitivity", self.base_reputation_sensitivity)?;
        ensure_non_negative("lab.audit_coefficient", self.base_audit_coefficient)?;
        ensure_non_negative(
            "lab.reputation_escalation_factor",
            self.reputation_escalation_factor,
        )?;
        ensure_non_negative("lab.racing_gap_sensitivity", self.racing_gap_sensitivity)?;
        ensure_positive("lab.capability_scale", self.capability_scale)?;
        Ok(())
    }
}

impl Default for LabParams {
    fn default() -> Self {
        Self::from_config(&LabGenerationConfig::default(), 200.0, 100.0, 1.0, 2e25, 0.0)
    }
}

/// State that only lives for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub permits_held: u64,
    pub collateral_posted: f64,
    /// Outcome of the most recent compliance decision
    pub is_compliant: bool,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            permits_held: 0,
            collateral_posted: 0.0,
            is_compliant: true,
        }
    }
}

/// State that evolves across steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicState {
    pub failed_audit_count: u32,
    /// Never below the base coefficient
    pub audit_coefficient: f64,
    /// Never below the base sensitivity
    pub reputation_sensitivity: f64,
    /// Number of successful training runs so far
    pub cumulative_capability: f64,
    pub racing_factor: f64,
}

impl DynamicState {
    fn initial(params: &LabParams) -> Self {
        Self {
            failed_audit_count: 0,
            audit_coefficient: params.base_audit_coefficient,
            reputation_sensitivity: params.base_reputation_sensitivity,
            cumulative_capability: 0.0,
            racing_factor: params.base_racing_factor,
        }
    }
}

/// One simulated firm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub id: LabId,
    params: LabParams,
    step: StepState,
    dynamics: DynamicState,
}

impl Lab {
    /// Create a lab; negative usage or rates are a caller bug and fail here
    pub fn new(id: LabId, params: LabParams) -> Result<Self> {
        params.validate()?;
        let dynamics = DynamicState::initial(&params);
        Ok(Self {
            id,
            params,
            step: StepState::default(),
            dynamics,
        })
    }

    pub fn params(&self) -> &LabParams {
        &self.params
    }

    pub fn dynamics(&self) -> &DynamicState {
        &self.dynamics
    }

    pub fn step_state(&self) -> &StepState {
        &self.step
    }

    pub fn is_compliant(&self) -> bool {
        self.step.is_compliant
    }

    /// Record the permits won in this step's market round
    pub fn assign_permits(&mut self, permits: u64) {
        self.step.permits_held = permits;
    }

    /// Overwrite the latest compliance decision
    pub fn set_compliant(&mut self, compliant: bool) {
        self.step.is_compliant = compliant;
    }

    /// Training runs larger than the threshold need permits
    pub fn requires_permit(&self, threshold: f64) -> bool {
        self.params.planned_usage > threshold
    }

    /// Willingness to pay for the right to run
    pub fn bid(&self, cost: f64) -> f64 {
        (self.params.economic_value - cost).max(0.0)
    }

    /// Permits needed to cover the planned run
    ///
    /// Binary permits (no FLOP conversion) need exactly one.
    pub fn permits_needed(&self, flops_per_permit: Option<f64>) -> u64 {
        match flops_per_permit {
            None => 1,
            Some(flops) => (self.params.planned_usage / flops).ceil() as u64,
        }
    }

    /// Market bid covering the whole run, value spread evenly per permit
    pub fn build_bid(&self, flops_per_permit: Option<f64>) -> Bid {
        let quantity = self.permits_needed(flops_per_permit);
        let price_per_unit = if quantity == 0 {
            0.0
        } else {
            self.bid(0.0) / quantity as f64
        };
        Bid::new(self.id, quantity, price_per_unit)
    }

    /// Planned usage not covered by the permits held
    pub fn uncovered_usage(&self, flops_per_permit: Option<f64>) -> f64 {
        let planned = self.params.planned_usage;
        match flops_per_permit {
            None if self.step.permits_held >= 1 => 0.0,
            None => planned,
            Some(flops) => (planned - self.step.permits_held as f64 * flops).max(0.0),
        }
    }

    /// Permits still missing for a fully covered run
    pub fn permits_short(&self, flops_per_permit: Option<f64>) -> u64 {
        self.permits_needed(flops_per_permit)
            .saturating_sub(self.step.permits_held)
    }

    /// Clear per-step state ahead of a new step
    pub fn begin_step(&mut self) {
        self.step = StepState {
            collateral_posted: self.step.collateral_posted,
            ..StepState::default()
        };
    }

    pub fn post_collateral(&mut self, amount: f64) {
        debug_assert!(amount >= 0.0);
        self.step.collateral_posted = amount;
    }

    /// Zero the posted collateral, returning what was held
    pub fn release_collateral(&mut self) -> f64 {
        std::mem::take(&mut self.step.collateral_posted)
    }
}
