//! Multi-step run driver with a per-lab wealth ledger

use ahash::AHashMap;
use rand::SeedableRng;

use crate::core::config::{MarketConfig, ScenarioConfig};
use crate::core::error::Result;
use crate::core::types::{LabId, SimRng, Step};
use crate::enforcement::Auditor;
use crate::lab::Lab;
use crate::market::{MarketMechanism, PermitMarket};
use crate::simulation::output::{LabSnapshot, SimulationOutput, StepRecord};
use crate::simulation::population::generate_labs;
use crate::simulation::step::{execute_step, StepOutcome};

/// Build the market described by the config
pub fn build_market(config: &MarketConfig) -> Result<PermitMarket> {
    match config.fixed_price {
        Some(price) => PermitMarket::with_fixed_price(config.permit_cap, price),
        None => Ok(PermitMarket::new(config.permit_cap)),
    }
}

/// A running scenario: labs, market, regulator and the rng they share
pub struct Simulation {
    config: ScenarioConfig,
    seed: u64,
    labs: Vec<Lab>,
    market: PermitMarket,
    auditor: Auditor,
    rng: SimRng,
    wealth: AHashMap<LabId, f64>,
    step: Step,
}

impl Simulation {
    /// Validate the config and generate the population from `seed`
    pub fn new(config: ScenarioConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = SimRng::seed_from_u64(seed);
        let labs = generate_labs(&config, &mut rng)?;
        Self::with_labs(config, seed, labs, rng)
    }

    /// Run a hand-built population instead of a generated one
    pub fn from_labs(config: ScenarioConfig, seed: u64, labs: Vec<Lab>) -> Result<Self> {
        config.validate()?;
        Self::with_labs(config, seed, labs, SimRng::seed_from_u64(seed))
    }

    fn with_labs(config: ScenarioConfig, seed: u64, labs: Vec<Lab>, rng: SimRng) -> Result<Self> {
        let market = build_market(&config.market)?;
        let auditor = Auditor::new(config.audit.clone())?;
        let wealth = labs.iter().map(|l| (l.id, 0.0)).collect();
        Ok(Self {
            config,
            seed,
            labs,
            market,
            auditor,
            rng,
            wealth,
            step: 0,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn labs(&self) -> &[Lab] {
        &self.labs
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn wealth(&self, lab_id: LabId) -> f64 {
        self.wealth.get(&lab_id).copied().unwrap_or(0.0)
    }

    /// Advance one step and settle the wealth ledger
    pub fn step(&mut self) -> StepRecord {
        let outcome = execute_step(
            &mut self.labs,
            &mut self.market,
            &self.auditor,
            &self.config,
            &mut self.rng,
        );
        self.settle(&outcome);
        let record = self.record(&outcome);

        tracing::info!(
            "Step {}: price={:.2} compliance={:.1}% violations={} audits={} catches={}",
            record.step,
            record.clearing_price,
            record.compliance_rate * 100.0,
            record.violations,
            record.audits_performed,
            record.catches
        );

        self.step += 1;
        record
    }

    /// Apply one step's cash flows to every lab's wealth
    fn settle(&mut self, outcome: &StepOutcome) {
        for (lab, agent) in self.labs.iter().zip(&outcome.agents) {
            let mut delta = agent.collateral_refunded - agent.collateral_posted;
            delta -= outcome.clearing_price * agent.permits_allocated as f64;
            delta -= agent.penalty;
            if agent.ran {
                delta += lab.params().economic_value;
            }
            *self.wealth.entry(lab.id).or_insert(0.0) += delta;
        }
    }

    fn record(&self, outcome: &StepOutcome) -> StepRecord {
        let labs = self
            .labs
            .iter()
            .zip(&outcome.agents)
            .map(|(lab, agent)| {
                let dynamics = lab.dynamics();
                LabSnapshot {
                    lab_id: lab.id,
                    permits: agent.permits_allocated,
                    compliant: agent.compliant,
                    usage: agent.usage,
                    audited: agent.audited,
                    caught: agent.caught,
                    false_positive: agent.false_positive,
                    penalty: agent.penalty,
                    wealth: self.wealth(lab.id),
                    audit_coefficient: dynamics.audit_coefficient,
                    reputation_sensitivity: dynamics.reputation_sensitivity,
                    racing_factor: dynamics.racing_factor,
                    cumulative_capability: dynamics.cumulative_capability,
                }
            })
            .collect();

        StepRecord {
            step: self.step,
            clearing_price: outcome.clearing_price,
            supply: self.market.max_supply(),
            permits_allocated: outcome.permits_allocated(),
            compliance_rate: outcome.compliance_rate(),
            violations: outcome.violations(),
            audits_triggered: outcome.audits_triggered,
            audits_performed: outcome.audits_performed,
            catches: outcome.catches(),
            labs,
        }
    }

    /// Run the configured number of steps and collect the output
    pub fn run(mut self) -> SimulationOutput {
        let start = std::time::Instant::now();
        let records: Vec<StepRecord> = (0..self.config.steps).map(|_| self.step()).collect();
        SimulationOutput::new(self.config, self.seed, records, start.elapsed())
    }
}

/// Run a whole scenario
///
/// A missing seed is drawn from the OS here, and reported in the output so the
/// run can be replayed.
pub fn simulate(config: &ScenarioConfig) -> Result<SimulationOutput> {
    let seed = config.seed.unwrap_or_else(rand::random);
    tracing::info!(
        "Running '{}': {} labs, {} steps, seed {}",
        config.name,
        config.n_agents,
        config.steps,
        seed
    );
    Ok(Simulation::new(config.clone(), seed)?.run())
}
