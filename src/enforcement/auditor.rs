//! The regulator: suspicion signals, audit odds, detection and penalties
//!
//! Audits happen in two stages. Stage one decides whether an audit occurs:
//!
//! ```text
//! signal  = min(1, (excess / threshold) ^ exponent)
//! p_audit = min(1, (base + signal * (high - base)) * c(i))
//! ```
//!
//! Stage two decides whether the audit finds a real violation. The direct
//! pass misses with probability FNR; backcheck, whistleblower and monitoring
//! are independent channels that each shrink the surviving miss probability.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::AuditPolicy;
use crate::core::error::Result;
use crate::core::types::SimRng;

/// Outcome tags of one resolved audit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResolution {
    /// A real violation was found by at least one channel
    pub caught: bool,
    /// The backcheck channel alone would have found it (analytics only)
    pub caught_via_backcheck: bool,
    /// A compliant lab was flagged in error (never penalised)
    pub false_positive: bool,
}

#[derive(Debug, Clone)]
pub struct Auditor {
    policy: AuditPolicy,
}

impl Auditor {
    /// Build an auditor, rejecting a policy with out-of-range rates
    pub fn new(policy: AuditPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    /// Suspicion from unpermitted usage, in [0, 1]
    ///
    /// A zero threshold makes any positive excess fully visible.
    pub fn compute_signal(&self, excess: f64, threshold: f64) -> f64 {
        debug_assert!(excess >= 0.0, "negative excess usage {excess}");
        if excess <= 0.0 {
            return 0.0;
        }
        if threshold <= 0.0 {
            return 1.0;
        }
        (excess / threshold).powf(self.policy.signal_exponent).min(1.0)
    }

    /// Signal as seen by the regulator: compliant labs emit nothing
    pub fn signal_strength(&self, excess: f64, threshold: f64, is_compliant: bool) -> f64 {
        if is_compliant {
            0.0
        } else {
            self.compute_signal(excess, threshold)
        }
    }

    /// Probability that an audit is launched against one lab
    ///
    /// A signal-blind regulator ignores the signal entirely.
    pub fn audit_probability(&self, signal: f64, audit_coefficient: f64) -> f64 {
        let p = &self.policy;
        let signal = if p.signal_dependent { signal } else { 0.0 };
        let rate = p.base_prob + signal * (p.high_prob - p.base_prob);
        (rate * audit_coefficient).clamp(0.0, 1.0)
    }

    /// Residual miss probability left by the supplementary channels
    fn supplementary_miss(&self) -> f64 {
        let p = &self.policy;
        (1.0 - p.backcheck_prob) * (1.0 - p.whistleblower_prob) * (1.0 - p.monitoring_prob)
    }

    /// P(violation found | audited, violating)
    pub fn catch_probability(&self) -> f64 {
        1.0 - self.policy.false_negative_rate * self.supplementary_miss()
    }

    /// Effective probability of being caught, as a lab anticipates it
    ///
    /// `1 - (1 - p_audit * (1 - FNR)) * prod(1 - p_c)` over backcheck,
    /// whistleblower and monitoring.
    pub fn detection_probability(&self, p_audit: f64) -> f64 {
        let p_catch = p_audit * (1.0 - self.policy.false_negative_rate);
        1.0 - (1.0 - p_catch) * self.supplementary_miss()
    }

    /// Signal, audit odds and channel composition in one call
    pub fn anticipated_detection(&self, excess: f64, threshold: f64, audit_coefficient: f64) -> f64 {
        let signal = self.compute_signal(excess, threshold);
        self.detection_probability(self.audit_probability(signal, audit_coefficient))
    }

    /// Draw whether an audit fires at probability `p_audit`
    pub fn decide_audit(&self, p_audit: f64, rng: &mut SimRng) -> bool {
        rng.gen::<f64>() < p_audit
    }

    /// Resolve an audit that has fired
    ///
    /// Compliant labs take one draw (false positive); violating labs take
    /// four (direct, backcheck, whistleblower, monitoring). The count depends
    /// only on `is_violating`, keeping runs reproducible under a fixed seed.
    pub fn resolve_audit(&self, is_violating: bool, rng: &mut SimRng) -> AuditResolution {
        let p = &self.policy;

        if !is_violating {
            let false_positive = rng.gen::<f64>() < p.false_positive_rate;
            return AuditResolution {
                caught: false,
                caught_via_backcheck: false,
                false_positive,
            };
        }

        let direct = rng.gen::<f64>() < 1.0 - p.false_negative_rate;
        let backcheck = rng.gen::<f64>() < p.backcheck_prob;
        let whistleblower = rng.gen::<f64>() < p.whistleblower_prob;
        let monitoring = rng.gen::<f64>() < p.monitoring_prob;

        AuditResolution {
            caught: direct || backcheck || whistleblower || monitoring,
            caught_via_backcheck: backcheck,
            false_positive: false,
        }
    }

    /// Penalty charged for a verified violation
    ///
    /// Flat mode returns the lab's own amount. Flexible mode charges
    /// `max(floor, pct * revenue)`. A ceiling caps either.
    pub fn compute_penalty(&self, flat_amount: f64, firm_revenue: f64) -> f64 {
        let p = &self.policy;
        let penalty = if p.uses_flexible_penalty() {
            let floor = p.penalty_fixed.unwrap_or(0.0);
            let share = p.penalty_percentage.unwrap_or(0.0) * firm_revenue;
            floor.max(share)
        } else {
            flat_amount
        };

        match p.penalty_ceiling {
            Some(ceiling) => penalty.min(ceiling),
            None => penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const EPS: f64 = 1e-9;

    fn auditor(policy: AuditPolicy) -> Auditor {
        Auditor::new(policy).unwrap()
    }

    #[test]
    fn test_signal_linear() {
        let a = auditor(AuditPolicy::default());
        assert_eq!(a.compute_signal(0.0, 1e25), 0.0);
        assert!((a.compute_signal(0.5e25, 1e25) - 0.5).abs() < EPS);
        assert!((a.compute_signal(1e25, 1e25) - 1.0).abs() < EPS);
        assert!((a.compute_signal(3e25, 1e25) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_signal_exponent_shapes_visibility() {
        let quadratic = auditor(AuditPolicy {
            signal_exponent: 2.0,
            ..Default::default()
        });
        assert!((quadratic.compute_signal(0.5e25, 1e25) - 0.25).abs() < EPS);

        let sqrt = auditor(AuditPolicy {
            signal_exponent: 0.5,
            ..Default::default()
        });
        assert!((sqrt.compute_signal(0.25e25, 1e25) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_zero_threshold_is_fully_visible() {
        let a = auditor(AuditPolicy::default());
        assert_eq!(a.compute_signal(1.0, 0.0), 1.0);
        assert_eq!(a.compute_signal(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_compliant_labs_emit_no_signal() {
        let a = auditor(AuditPolicy::default());
        assert_eq!(a.signal_strength(5e25, 1e25, true), 0.0);
        assert_eq!(a.signal_strength(5e25, 1e25, false), 1.0);
    }

    #[test]
    fn test_audit_probability_interpolates_and_caps() {
        let a = auditor(AuditPolicy {
            base_prob: 0.1,
            high_prob: 0.5,
            signal_dependent: true,
            ..Default::default()
        });
        assert!((a.audit_probability(0.0, 1.0) - 0.1).abs() < EPS);
        assert!((a.audit_probability(0.5, 1.0) - 0.3).abs() < EPS);
        assert!((a.audit_probability(1.0, 2.0) - 1.0).abs() < EPS);
        assert!((a.audit_probability(1.0, 100.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_signal_blind_regulator_ignores_signal() {
        let a = auditor(AuditPolicy {
            base_prob: 0.1,
            high_prob: 0.9,
            signal_dependent: false,
            ..Default::default()
        });
        assert!((a.audit_probability(1.0, 1.0) - 0.1).abs() < EPS);
        assert!((a.audit_probability(1.0, 2.0) - 0.2).abs() < EPS);
    }

    #[test]
    fn test_detection_composition() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 0.5,
            backcheck_prob: 0.2,
            whistleblower_prob: 0.1,
            monitoring_prob: 0.3,
            ..Default::default()
        });
        // p_catch = 0.4 * 0.5 = 0.2; miss = 0.8 * 0.8 * 0.9 * 0.7 = 0.4032
        assert!((a.detection_probability(0.4) - (1.0 - 0.4032)).abs() < EPS);
        // No audit still leaves the independent channels: 0.8 * 0.9 * 0.7
        assert!((a.detection_probability(0.0) - (1.0 - 0.504)).abs() < EPS);
        // Given an audit: 1 - 0.5 * 0.504
        assert!((a.catch_probability() - 0.748).abs() < EPS);
    }

    #[test]
    fn test_monitoring_alone_catches_violators() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 1.0,
            monitoring_prob: 1.0,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        for _ in 0..20 {
            let r = a.resolve_audit(true, &mut rng);
            assert!(r.caught);
            assert!(!r.caught_via_backcheck);
            assert!(!r.false_positive);
        }
    }

    #[test]
    fn test_compliant_resolution_takes_one_draw() {
        let a = auditor(AuditPolicy {
            false_positive_rate: 0.5,
            backcheck_prob: 0.5,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        let mut twin = SimRng::seed_from_u64(42);
        a.resolve_audit(false, &mut rng);
        let _: f64 = twin.gen();
        assert_eq!(rng.gen::<u64>(), twin.gen::<u64>());
    }

    #[test]
    fn test_catch_probability_given_audit() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 0.4,
            backcheck_prob: 0.5,
            ..Default::default()
        });
        assert!((a.catch_probability() - 0.8).abs() < EPS);
    }

    #[test]
    fn test_perfect_audit_always_catches_violators() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 0.0,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        for _ in 0..100 {
            let r = a.resolve_audit(true, &mut rng);
            assert!(r.caught);
            assert!(!r.false_positive);
        }
    }

    #[test]
    fn test_compliant_labs_are_never_caught() {
        let a = auditor(AuditPolicy {
            false_positive_rate: 1.0,
            backcheck_prob: 1.0,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        let r = a.resolve_audit(false, &mut rng);
        assert!(!r.caught);
        assert!(r.false_positive);
    }

    #[test]
    fn test_backcheck_tag_is_reported() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 1.0,
            backcheck_prob: 1.0,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        let r = a.resolve_audit(true, &mut rng);
        assert!(r.caught);
        assert!(r.caught_via_backcheck);
    }

    #[test]
    fn test_empirical_catch_rate_matches_formula() {
        let a = auditor(AuditPolicy {
            false_negative_rate: 0.6,
            backcheck_prob: 0.25,
            whistleblower_prob: 0.1,
            ..Default::default()
        });
        let mut rng = SimRng::seed_from_u64(42);
        let trials = 20_000;
        let caught = (0..trials).filter(|_| a.resolve_audit(true, &mut rng).caught).count();
        let rate = caught as f64 / trials as f64;
        assert!((rate - a.catch_probability()).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn test_flat_penalty() {
        let a = auditor(AuditPolicy::default());
        assert_eq!(a.compute_penalty(200.0, 10_000.0), 200.0);
    }

    #[test]
    fn test_flexible_penalty_takes_larger_term() {
        let a = auditor(AuditPolicy {
            penalty_fixed: Some(35.0),
            penalty_percentage: Some(0.07),
            ..Default::default()
        });
        assert!((a.compute_penalty(200.0, 100.0) - 35.0).abs() < EPS);
        assert!((a.compute_penalty(200.0, 1000.0) - 70.0).abs() < EPS);
    }

    #[test]
    fn test_penalty_ceiling_caps_both_modes() {
        let flexible = auditor(AuditPolicy {
            penalty_percentage: Some(0.5),
            penalty_ceiling: Some(100.0),
            ..Default::default()
        });
        assert_eq!(flexible.compute_penalty(0.0, 1000.0), 100.0);

        let flat = auditor(AuditPolicy {
            penalty_ceiling: Some(50.0),
            ..Default::default()
        });
        assert_eq!(flat.compute_penalty(200.0, 0.0), 50.0);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(Auditor::new(AuditPolicy {
            whistleblower_prob: -0.1,
            ..Default::default()
        })
        .is_err());
    }
}
