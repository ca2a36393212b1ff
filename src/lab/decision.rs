//! Deterrence-based compliance decision
//!
//! A lab complies when expected punishment covers what it gains by running
//! without permits: `p * B >= g`.

use super::Lab;

impl Lab {
    /// Gain from running without the missing permits
    ///
    /// Saved permit spend is bounded by what the run is worth; racing adds the
    /// capability premium regardless of price.
    pub fn gain_from_violating(&self, market_price: f64) -> f64 {
        let saved = market_price.min(self.params.economic_value);
        saved + self.dynamics.racing_factor * self.params.capability_value
    }

    /// Perceived total sanction: `(penalty + collateral + reputation) * risk`
    pub fn perceived_sanction(&self, penalty: f64) -> f64 {
        (penalty + self.step.collateral_posted + self.dynamics.reputation_sensitivity)
            * self.params.risk_profile
    }

    /// Decide whether to comply and record the decision
    ///
    /// Returns true when the lab complies (does not run unpermitted).
    pub fn decide_compliance(
        &mut self,
        market_price: f64,
        penalty: f64,
        detection_prob: f64,
        cost: f64,
    ) -> bool {
        debug_assert!((0.0..=1.0).contains(&detection_prob));

        let gain = self.gain_from_violating(market_price);

        // No incentive, or running would lose money anyway
        if gain <= 0.0 || self.params.economic_value - cost <= 0.0 {
            self.step.is_compliant = true;
            return true;
        }

        let sanction = self.perceived_sanction(penalty);
        let expected_punishment = detection_prob * sanction;

        tracing::debug!(
            "{} decision: gain={:.3} p={:.3} B={:.3} E[punishment]={:.3}",
            self.id,
            gain,
            detection_prob,
            sanction,
            expected_punishment
        );

        let compliant = expected_punishment >= gain;
        if !compliant {
            tracing::info!(
                "{} violating: gain {:.3} exceeds expected punishment {:.3}",
                self.id,
                gain,
                expected_punishment
            );
        }
        self.step.is_compliant = compliant;
        compliant
    }
}
