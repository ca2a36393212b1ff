//! Cross-step dynamics: escalation after failed audits, decay, racing

use super::Lab;

impl Lab {
    /// Apply the consequences of a failed audit
    ///
    /// Reputation compounds per failure; the audit coefficient jumps by
    /// `escalation` and later decays back.
    pub fn on_audit_failure(&mut self, escalation: f64) {
        let d = &mut self.dynamics;
        d.failed_audit_count += 1;
        d.reputation_sensitivity = self.params.base_reputation_sensitivity
            * (1.0 + self.params.reputation_escalation_factor).powi(d.failed_audit_count as i32);
        d.audit_coefficient += escalation;
    }

    /// Pull an escalated audit coefficient toward its base value
    ///
    /// `coeff = base + (coeff - base) * decay_rate`
    pub fn decay_audit_coefficient(&mut self, decay_rate: f64) {
        let base = self.params.base_audit_coefficient;
        let excess = (self.dynamics.audit_coefficient - base).max(0.0);
        self.dynamics.audit_coefficient = base + excess * decay_rate;
    }

    /// Count one more successful training run
    pub fn record_run(&mut self) {
        self.dynamics.cumulative_capability += 1.0;
    }

    /// Recompute racing pressure from standing against the population mean
    ///
    /// Labs ahead of the mean race harder, labs behind race less.
    pub fn update_racing_factor(&mut self, mean_capability: f64) {
        let gap = self.dynamics.cumulative_capability - mean_capability;
        let multiplier =
            1.0 + self.params.racing_gap_sensitivity * gap / self.params.capability_scale;
        self.dynamics.racing_factor = (self.params.base_racing_factor * multiplier).max(0.0);
    }
}
