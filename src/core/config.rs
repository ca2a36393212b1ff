//! Scenario configuration with documented defaults
//!
//! All tunable numbers are collected here. Monetary values are in millions of
//! USD (M$), compute is in FLOP. Configs are validated once at construction
//! time; the per-step core trusts them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{
    ensure_non_negative, ensure_positive, ensure_probability, ensure_range, PermitError, Result,
};

/// Enforcement policy of the regulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPolicy {
    /// Baseline audit probability applied to every above-threshold lab (pi_0)
    pub base_prob: f64,

    /// Audit probability for a maximally suspicious lab (pi_1)
    ///
    /// The effective rate interpolates between `base_prob` and `high_prob`
    /// by signal strength.
    pub high_prob: f64,

    /// P(false alarm | compliant lab audited). Reported, never penalised.
    pub false_positive_rate: f64,

    /// P(miss | violating lab audited) for the direct audit pass
    pub false_negative_rate: f64,

    /// Flat penalty copied onto every generated lab (M$)
    pub penalty_amount: f64,

    /// Fixed penalty floor (M$). Setting this enables flexible penalties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_fixed: Option<f64>,

    /// Fraction of firm revenue charged. Setting this enables flexible penalties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_percentage: Option<f64>,

    /// Cap on any computed penalty (limited liability)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_ceiling: Option<f64>,

    /// Probability that historical records expose a violation the audit missed
    pub backcheck_prob: f64,

    /// Probability that an insider reports a violation
    pub whistleblower_prob: f64,

    /// Probability that hardware/electricity metering flags a violation
    pub monitoring_prob: f64,

    /// Budget: most audits the regulator can run in one step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audits_per_step: Option<usize>,

    /// Added to a lab's audit coefficient after each failed audit
    pub audit_escalation: f64,

    /// Per-step factor pulling an escalated coefficient back toward base
    ///
    /// At 0.8 the escalated excess shrinks by 20% every step.
    pub audit_decay_rate: f64,

    /// Shape of the excess-to-signal curve
    ///
    /// 1.0 is linear, below 1.0 makes small excess visible, above 1.0 hides it.
    pub signal_exponent: f64,

    /// When true the regulator targets by signal; when false it audits blind
    pub signal_dependent: bool,

    /// Regulator cost per audit performed (reporting only)
    pub audit_cost: f64,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            base_prob: 0.05,
            high_prob: 0.05,
            false_positive_rate: 0.0,
            false_negative_rate: 0.40,
            penalty_amount: 200.0,
            penalty_fixed: None,
            penalty_percentage: None,
            penalty_ceiling: None,
            backcheck_prob: 0.0,
            whistleblower_prob: 0.0,
            monitoring_prob: 0.0,
            max_audits_per_step: None,
            audit_escalation: 0.0,
            audit_decay_rate: 0.8,
            signal_exponent: 1.0,
            signal_dependent: false,
            audit_cost: 1.0,
        }
    }
}

impl AuditPolicy {
    /// Flexible penalties are active once either a floor or a revenue rate is set
    pub fn uses_flexible_penalty(&self) -> bool {
        self.penalty_fixed.is_some() || self.penalty_percentage.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        ensure_probability("audit.base_prob", self.base_prob)?;
        ensure_probability("audit.high_prob", self.high_prob)?;
        ensure_probability("audit.false_positive_rate", self.false_positive_rate)?;
        ensure_probability("audit.false_negative_rate", self.false_negative_rate)?;
        ensure_probability("audit.backcheck_prob", self.backcheck_prob)?;
        ensure_probability("audit.whistleblower_prob", self.whistleblower_prob)?;
        ensure_probability("audit.monitoring_prob", self.monitoring_prob)?;
        ensure_probability("audit.audit_decay_rate", self.audit_decay_rate)?;
        ensure_non_negative("audit.penalty_amount", self.penalty_amount)?;
        ensure_non_negative("audit.audit_escalation", self.audit_escalation)?;
        ensure_non_negative("audit.audit_cost", self.audit_cost)?;
        ensure_positive("audit.signal_exponent", self.signal_exponent)?;
        if let Some(fixed) = self.penalty_fixed {
            ensure_non_negative("audit.penalty_fixed", fixed)?;
        }
        if let Some(pct) = self.penalty_percentage {
            ensure_probability("audit.penalty_percentage", pct)?;
        }
        if let Some(ceiling) = self.penalty_ceiling {
            ensure_non_negative("audit.penalty_ceiling", ceiling)?;
        }
        Ok(())
    }
}

/// Permit market configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Total permits available per step (Q)
    pub permit_cap: u64,

    /// Sell every permit at this price instead of auctioning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_price: Option<f64>,

    /// FLOP covered by one permit. Absent means binary permits (one per run).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flops_per_permit: Option<f64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            permit_cap: 20,
            fixed_price: None,
            flops_per_permit: None,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(price) = self.fixed_price {
            ensure_non_negative("market.fixed_price", price)?;
        }
        if let Some(flops) = self.flops_per_permit {
            ensure_positive("market.flops_per_permit", flops)?;
        }
        Ok(())
    }
}

/// Parameters used when generating the lab population
///
/// Ranged values are drawn uniformly per lab; the rest are shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabGenerationConfig {
    /// Value of one training run (M$)
    pub economic_value_min: f64,
    pub economic_value_max: f64,

    /// Multiplier on perceived sanctions (>1 risk-averse, <1 risk-seeking)
    pub risk_profile_min: f64,
    pub risk_profile_max: f64,

    /// Planned training run size (FLOP)
    pub training_flops_min: f64,
    pub training_flops_max: f64,

    /// Annual revenue (M$), only used by percentage penalties
    pub firm_revenue_min: f64,
    pub firm_revenue_max: f64,

    /// Baseline strategic value of the capability gained by running (V_b)
    pub capability_value: f64,

    /// Urgency multiplier on capability value (c_r)
    pub racing_factor: f64,

    /// Perceived reputation cost if caught (R)
    pub reputation_sensitivity: f64,

    /// Firm-specific scaling of the audit rate, c(i)
    pub audit_coefficient: f64,

    /// Reputation multiplier per failed audit: R_t = R * (1 + f)^failures
    pub reputation_escalation_factor: f64,

    /// How strongly the capability gap to the mean moves the racing factor
    pub racing_gap_sensitivity: f64,

    /// Normalisation for the capability gap
    pub capability_scale: f64,
}

impl Default for LabGenerationConfig {
    fn default() -> Self {
        Self {
            economic_value_min: 50.0,
            economic_value_max: 200.0,
            risk_profile_min: 1.0,
            risk_profile_max: 1.0,
            training_flops_min: 1e24,
            training_flops_max: 1e26,
            firm_revenue_min: 0.0,
            firm_revenue_max: 0.0,
            capability_value: 0.0,
            racing_factor: 1.0,
            reputation_sensitivity: 0.0,
            audit_coefficient: 0.8,
            reputation_escalation_factor: 0.0,
            racing_gap_sensitivity: 0.0,
            capability_scale: 100.0,
        }
    }
}

impl LabGenerationConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_range("lab.economic_value", self.economic_value_min, self.economic_value_max)?;
        ensure_range("lab.risk_profile", self.risk_profile_min, self.risk_profile_max)?;
        ensure_range("lab.training_flops", self.training_flops_min, self.training_flops_max)?;
        ensure_range("lab.firm_revenue", self.firm_revenue_min, self.firm_revenue_max)?;
        ensure_non_negative("lab.capability_value", self.capability_value)?;
        ensure_non_negative("lab.racing_factor", self.racing_factor)?;
        ensure_non_negative("lab.reputation_sensitivity", self.reputation_sensitivity)?;
        ensure_non_negative("lab.audit_coefficient", self.audit_coefficient)?;
        ensure_non_negative(
            "lab.reputation_escalation_factor",
            self.reputation_escalation_factor,
        )?;
        ensure_non_negative("lab.racing_gap_sensitivity", self.racing_gap_sensitivity)?;
        ensure_positive("lab.capability_scale", self.capability_scale)?;
        Ok(())
    }
}

/// Root configuration for one simulation scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: String,

    /// Number of labs in the population
    pub n_agents: u32,

    /// Number of steps in a run
    pub steps: u32,

    /// Training runs above this size (FLOP) need permits
    pub flop_threshold: f64,

    /// Refundable deposit posted by every above-threshold lab (M$). 0 disables.
    pub collateral_amount: f64,

    /// Seed for the run's random source. None draws one at run start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub audit: AuditPolicy,
    pub market: MarketConfig,
    pub lab: LabGenerationConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "Scenario".to_string(),
            description: String::new(),
            n_agents: 10,
            steps: 10,
            flop_threshold: 1e25,
            collateral_amount: 0.0,
            seed: None,
            audit: AuditPolicy::default(),
            market: MarketConfig::default(),
            lab: LabGenerationConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every option group
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("flop_threshold", self.flop_threshold)?;
        ensure_non_negative("collateral_amount", self.collateral_amount)?;
        self.audit.validate()?;
        self.market.validate()?;
        self.lab.validate()?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a scenario file; the format follows the extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => Self::from_toml_str(&content),
            ConfigFormat::Json => Self::from_json_str(&content),
        }
    }

    /// Write this scenario to disk; the format follows the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => self.to_toml_string()?,
            ConfigFormat::Json => self.to_json_string()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(PermitError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_populated() -> ScenarioConfig {
        ScenarioConfig {
            name: "Strict".into(),
            description: "every knob set".into(),
            n_agents: 12,
            steps: 7,
            flop_threshold: 2e25,
            collateral_amount: 15.0,
            seed: Some(99),
            audit: AuditPolicy {
                base_prob: 0.1,
                high_prob: 0.6,
                false_positive_rate: 0.05,
                false_negative_rate: 0.2,
                penalty_amount: 120.0,
                penalty_fixed: Some(35.0),
                penalty_percentage: Some(0.07),
                penalty_ceiling: Some(500.0),
                backcheck_prob: 0.1,
                whistleblower_prob: 0.05,
                monitoring_prob: 0.02,
                max_audits_per_step: Some(3),
                audit_escalation: 0.5,
                audit_decay_rate: 0.7,
                signal_exponent: 0.5,
                signal_dependent: true,
                audit_cost: 2.5,
            },
            market: MarketConfig {
                permit_cap: 40,
                fixed_price: Some(70.0),
                flops_per_permit: Some(1e24),
            },
            lab: LabGenerationConfig {
                economic_value_min: 10.0,
                economic_value_max: 20.0,
                risk_profile_min: 0.8,
                risk_profile_max: 1.2,
                training_flops_min: 1e25,
                training_flops_max: 5e25,
                firm_revenue_min: 100.0,
                firm_revenue_max: 1000.0,
                capability_value: 5.0,
                racing_factor: 1.5,
                reputation_sensitivity: 3.0,
                audit_coefficient: 1.0,
                reputation_escalation_factor: 0.5,
                racing_gap_sensitivity: 0.25,
                capability_scale: 10.0,
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.audit.uses_flexible_penalty());
    }

    #[test]
    fn test_toml_round_trip_keeps_every_field() {
        let config = fully_populated();
        let text = config.to_toml_string().unwrap();
        let parsed = ScenarioConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_round_trip_keeps_every_field() {
        let config = fully_populated();
        let text = config.to_json_string().unwrap();
        let parsed = ScenarioConfig::from_json_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed = ScenarioConfig::from_toml_str(
            r#"
            name = "Partial"
            steps = 3

            [market]
            permit_cap = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.steps, 3);
        assert_eq!(parsed.market.permit_cap, 5);
        assert_eq!(parsed.market.fixed_price, None);
        assert_eq!(parsed.audit, AuditPolicy::default());
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let mut config = ScenarioConfig::default();
        config.audit.false_negative_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(PermitError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_capability_scale_rejected() {
        let mut config = ScenarioConfig::default();
        config.lab.capability_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = ScenarioConfig::load(Path::new("scenario.yaml")).unwrap_err();
        // Reading fails first if the file is missing; either way it is an error
        assert!(matches!(
            err,
            PermitError::IoError(_) | PermitError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn test_save_and_load_from_disk() {
        let dir = std::env::temp_dir().join("compute_permit_sim_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("strict.toml");
        let config = fully_populated();
        config.save(&path).unwrap();
        let loaded = ScenarioConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }
}
