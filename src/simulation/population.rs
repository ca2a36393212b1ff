//! Random lab population

use rand::Rng;

use crate::core::config::ScenarioConfig;
use crate::core::error::Result;
use crate::core::types::{LabId, SimRng};
use crate::lab::{Lab, LabParams};

/// Uniform draw in `[min, max]`; a degenerate range yields `min`
fn uniform(rng: &mut SimRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// Generate `config.n_agents` labs with ids starting at 1
///
/// Every draw comes from `rng`, in lab order, so the same seed always
/// produces the same population.
pub fn generate_labs(config: &ScenarioConfig, rng: &mut SimRng) -> Result<Vec<Lab>> {
    let ranges = &config.lab;
    let mut labs = Vec::with_capacity(config.n_agents as usize);

    for i in 0..config.n_agents {
        let economic_value = uniform(rng, ranges.economic_value_min, ranges.economic_value_max);
        let risk_profile = uniform(rng, ranges.risk_profile_min, ranges.risk_profile_max);
        let planned_usage = uniform(rng, ranges.training_flops_min, ranges.training_flops_max);
        let firm_revenue = uniform(rng, ranges.firm_revenue_min, ranges.firm_revenue_max);

        let params = LabParams::from_config(
            ranges,
            config.audit.penalty_amount,
            economic_value,
            risk_profile,
            planned_usage,
            firm_revenue,
        );
        labs.push(Lab::new(LabId::new(i + 1), params)?);
    }

    tracing::debug!(
        "Generated {} labs, {} above the {:e} FLOP threshold",
        labs.len(),
        labs.iter()
            .filter(|l| l.requires_permit(config.flop_threshold))
            .count(),
        config.flop_threshold
    );

    Ok(labs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_population_size_and_ids() {
        let config = ScenarioConfig {
            n_agents: 5,
            ..Default::default()
        };
        let mut rng = SimRng::seed_from_u64(42);
        let labs = generate_labs(&config, &mut rng).unwrap();
        assert_eq!(labs.len(), 5);
        let ids: Vec<u32> = labs.iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_draws_stay_in_range() {
        let config = ScenarioConfig {
            n_agents: 50,
            ..Default::default()
        };
        let mut rng = SimRng::seed_from_u64(42);
        for lab in generate_labs(&config, &mut rng).unwrap() {
            let p = lab.params();
            assert!(p.economic_value >= 50.0 && p.economic_value <= 200.0);
            assert!(p.planned_usage >= 1e24 && p.planned_usage <= 1e26);
            assert_eq!(p.risk_profile, 1.0);
            assert_eq!(p.penalty_amount, config.audit.penalty_amount);
        }
    }

    #[test]
    fn test_degenerate_range_yields_min() {
        let mut config = ScenarioConfig {
            n_agents: 3,
            ..Default::default()
        };
        config.lab.economic_value_min = 80.0;
        config.lab.economic_value_max = 80.0;
        let mut rng = SimRng::seed_from_u64(42);
        for lab in generate_labs(&config, &mut rng).unwrap() {
            assert_eq!(lab.params().economic_value, 80.0);
        }
    }

    #[test]
    fn test_same_seed_same_population() {
        let config = ScenarioConfig::default();
        let a = generate_labs(&config, &mut SimRng::seed_from_u64(7)).unwrap();
        let b = generate_labs(&config, &mut SimRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_population() {
        let config = ScenarioConfig {
            n_agents: 0,
            ..Default::default()
        };
        let mut rng = SimRng::seed_from_u64(42);
        assert!(generate_labs(&config, &mut rng).unwrap().is_empty());
    }
}
