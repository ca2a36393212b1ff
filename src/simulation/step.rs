//! One simulation step
//!
//! Phases run in a fixed order inside a single call:
//! 0. collateral, 1. trading, 2. compliance, 3. realized-excess accounting,
//! 4. enforcement, 5. value realization (reported through `ran`),
//! 6. dynamic updates.

use serde::{Deserialize, Serialize};

use crate::core::config::ScenarioConfig;
use crate::core::types::{LabId, SimRng};
use crate::enforcement::{select_audits, AuditCandidate, Auditor, SelectionPolicy};
use crate::lab::Lab;
use crate::market::{Allocation, Bid, MarketMechanism};

/// How a lab's planned run played out this step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageClass {
    /// Run below the regulatory threshold, no permit needed
    BelowThreshold,
    /// Run fully covered by permits
    Permitted,
    /// Excess usage, but the lab chose not to run
    Deterred,
    /// Ran with usage its permits do not cover
    Violating,
}

impl UsageClass {
    pub fn ran(self) -> bool {
        !matches!(self, UsageClass::Deterred)
    }
}

/// Classify a lab after the compliance phase
///
/// Pure: depends only on the lab's current state. Returns the class and the
/// realized excess usage (non-zero only for violators).
pub fn classify_usage(lab: &Lab, threshold: f64, flops_per_permit: Option<f64>) -> (UsageClass, f64) {
    if !lab.requires_permit(threshold) {
        return (UsageClass::BelowThreshold, 0.0);
    }
    let uncovered = lab.uncovered_usage(flops_per_permit);
    if uncovered <= 0.0 {
        (UsageClass::Permitted, 0.0)
    } else if lab.is_compliant() {
        (UsageClass::Deterred, 0.0)
    } else {
        (UsageClass::Violating, uncovered)
    }
}

/// Per-lab results of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub lab_id: LabId,
    pub permits_allocated: u64,
    /// Anticipated detection probability used in the decision (0 if none was needed)
    pub detection_probability: f64,
    pub compliant: bool,
    pub usage: UsageClass,
    pub ran: bool,
    pub realized_excess: f64,
    /// Regulator's suspicion signal
    pub signal: f64,
    pub audited: bool,
    pub caught: bool,
    pub caught_via_backcheck: bool,
    pub false_positive: bool,
    pub penalty: f64,
    pub collateral_posted: f64,
    pub collateral_seized: bool,
    pub collateral_refunded: f64,
}

impl AgentOutcome {
    fn new(lab_id: LabId) -> Self {
        Self {
            lab_id,
            permits_allocated: 0,
            detection_probability: 0.0,
            compliant: true,
            usage: UsageClass::BelowThreshold,
            ran: true,
            realized_excess: 0.0,
            signal: 0.0,
            audited: false,
            caught: false,
            caught_via_backcheck: false,
            false_positive: false,
            penalty: 0.0,
            collateral_posted: 0.0,
            collateral_seized: false,
            collateral_refunded: 0.0,
        }
    }
}

/// Results of one step, agents in the order of the lab list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub clearing_price: f64,
    pub audits_triggered: usize,
    pub audits_performed: usize,
    pub agents: Vec<AgentOutcome>,
}

impl StepOutcome {
    pub fn agent(&self, lab_id: LabId) -> Option<&AgentOutcome> {
        self.agents.iter().find(|a| a.lab_id == lab_id)
    }

    /// Share of labs whose latest decision was to comply
    pub fn compliance_rate(&self) -> f64 {
        if self.agents.is_empty() {
            return 0.0;
        }
        let compliant = self.agents.iter().filter(|a| a.compliant).count();
        compliant as f64 / self.agents.len() as f64
    }

    pub fn violations(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| a.usage == UsageClass::Violating)
            .count()
    }

    pub fn catches(&self) -> usize {
        self.agents.iter().filter(|a| a.caught).count()
    }

    pub fn permits_allocated(&self) -> u64 {
        self.agents.iter().map(|a| a.permits_allocated).sum()
    }
}

/// Execute one full step over `labs`
///
/// Labs are mutated in place; every random draw comes from `rng`, so a fixed
/// seed reproduces the step exactly.
pub fn execute_step<M: MarketMechanism + ?Sized>(
    labs: &mut [Lab],
    market: &mut M,
    auditor: &Auditor,
    config: &ScenarioConfig,
    rng: &mut SimRng,
) -> StepOutcome {
    let threshold = config.flop_threshold;
    let flops_per_permit = config.market.flops_per_permit;

    let mut agents: Vec<AgentOutcome> = labs.iter().map(|l| AgentOutcome::new(l.id)).collect();
    for lab in labs.iter_mut() {
        lab.begin_step();
    }
    let regulated: Vec<bool> = labs.iter().map(|l| l.requires_permit(threshold)).collect();

    // 0. Collateral
    post_collateral(labs, &regulated, config.collateral_amount, &mut agents);

    // 1. Trading
    let allocation = run_market(labs, &regulated, market, flops_per_permit, rng);
    for (lab, agent) in labs.iter_mut().zip(agents.iter_mut()) {
        let permits = allocation.permits_for(lab.id);
        lab.assign_permits(permits);
        agent.permits_allocated = permits;
    }

    // 2. Compliance
    decide_compliance(
        labs,
        &regulated,
        auditor,
        allocation.clearing_price,
        threshold,
        flops_per_permit,
        &mut agents,
    );

    // 3. Realized excess
    for (lab, agent) in labs.iter().zip(agents.iter_mut()) {
        let (usage, excess) = classify_usage(lab, threshold, flops_per_permit);
        agent.usage = usage;
        agent.ran = usage.ran();
        agent.realized_excess = excess;
        agent.compliant = lab.is_compliant();
    }

    // 4. Enforcement
    let (triggered, performed) = enforce(labs, &regulated, auditor, threshold, &mut agents, rng);

    // 5. Value realization is left to the caller's ledger via `ran`

    // 6. Dynamics
    update_dynamics(labs, &agents, auditor.policy().audit_decay_rate);

    let outcome = StepOutcome {
        clearing_price: allocation.clearing_price,
        audits_triggered: triggered,
        audits_performed: performed,
        agents,
    };

    tracing::debug!(
        "Step resolved: price={:.3} compliance={:.2} violations={} audits={}/{} catches={}",
        outcome.clearing_price,
        outcome.compliance_rate(),
        outcome.violations(),
        outcome.audits_performed,
        outcome.audits_triggered,
        outcome.catches()
    );

    outcome
}

fn post_collateral(labs: &mut [Lab], regulated: &[bool], amount: f64, agents: &mut [AgentOutcome]) {
    if amount <= 0.0 {
        return;
    }
    for ((lab, agent), _) in labs
        .iter_mut()
        .zip(agents.iter_mut())
        .zip(regulated)
        .filter(|(_, &needs)| needs)
    {
        lab.post_collateral(amount);
        agent.collateral_posted = amount;
    }
}

fn run_market<M: MarketMechanism + ?Sized>(
    labs: &[Lab],
    regulated: &[bool],
    market: &mut M,
    flops_per_permit: Option<f64>,
    rng: &mut SimRng,
) -> Allocation {
    let bids: Vec<Bid> = labs
        .iter()
        .zip(regulated)
        .filter(|(_, &needs)| needs)
        .map(|(lab, _)| lab.build_bid(flops_per_permit))
        .collect();
    market.allocate(&bids, rng)
}

fn decide_compliance(
    labs: &mut [Lab],
    regulated: &[bool],
    auditor: &Auditor,
    clearing_price: f64,
    threshold: f64,
    flops_per_permit: Option<f64>,
    agents: &mut [AgentOutcome],
) {
    for ((lab, agent), _) in labs
        .iter_mut()
        .zip(agents.iter_mut())
        .zip(regulated)
        .filter(|(_, &needs)| needs)
    {
        let excess = lab.uncovered_usage(flops_per_permit);
        if excess <= 0.0 {
            lab.set_compliant(true);
            continue;
        }

        // Binary mode is one permit short; multi-unit labs save the price of
        // every permit they lack.
        let saved_spend = clearing_price * lab.permits_short(flops_per_permit) as f64;
        let detection =
            auditor.anticipated_detection(excess, threshold, lab.dynamics().audit_coefficient);
        let penalty =
            auditor.compute_penalty(lab.params().penalty_amount, lab.params().firm_revenue);

        agent.detection_probability = detection;
        lab.decide_compliance(saved_spend, penalty, detection, 0.0);
    }
}

fn enforce(
    labs: &mut [Lab],
    regulated: &[bool],
    auditor: &Auditor,
    threshold: f64,
    agents: &mut [AgentOutcome],
    rng: &mut SimRng,
) -> (usize, usize) {
    let policy = auditor.policy();

    let mut candidates = Vec::new();
    for (index, lab) in labs.iter().enumerate() {
        if !regulated[index] {
            continue;
        }
        let agent = &mut agents[index];
        let violating = agent.usage == UsageClass::Violating;
        agent.signal = auditor.signal_strength(agent.realized_excess, threshold, !violating);
        let p_audit = auditor.audit_probability(agent.signal, lab.dynamics().audit_coefficient);
        if auditor.decide_audit(p_audit, rng) {
            candidates.push(AuditCandidate {
                index,
                lab_id: lab.id,
                signal: agent.signal,
            });
        }
    }

    let triggered = candidates.len();
    let selected = select_audits(
        candidates,
        policy.max_audits_per_step,
        SelectionPolicy::for_regulator(policy.signal_dependent),
        rng,
    );

    for candidate in &selected {
        let lab = &mut labs[candidate.index];
        let agent = &mut agents[candidate.index];
        agent.audited = true;

        let resolution = auditor.resolve_audit(agent.usage == UsageClass::Violating, rng);
        agent.caught_via_backcheck = resolution.caught_via_backcheck;
        agent.false_positive = resolution.false_positive;

        if resolution.caught {
            agent.caught = true;
            agent.penalty =
                auditor.compute_penalty(lab.params().penalty_amount, lab.params().firm_revenue);
            agent.collateral_seized = lab.release_collateral() > 0.0;
            lab.on_audit_failure(policy.audit_escalation);
            tracing::info!("{} caught: penalty {:.3}", lab.id, agent.penalty);
        }
    }

    for (lab, agent) in labs.iter_mut().zip(agents.iter_mut()) {
        agent.collateral_refunded = lab.release_collateral();
    }

    (triggered, selected.len())
}

fn update_dynamics(labs: &mut [Lab], agents: &[AgentOutcome], decay_rate: f64) {
    for (lab, agent) in labs.iter_mut().zip(agents) {
        lab.decay_audit_coefficient(decay_rate);
        if agent.ran {
            lab.record_run();
        }
    }

    if labs.is_empty() {
        return;
    }
    let mean = labs
        .iter()
        .map(|l| l.dynamics().cumulative_capability)
        .sum::<f64>()
        / labs.len() as f64;
    for lab in labs.iter_mut() {
        lab.update_racing_factor(mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AuditPolicy;
    use crate::lab::LabParams;
    use crate::market::PermitMarket;
    use rand::SeedableRng;

    fn lab(id: u32, economic_value: f64, planned_usage: f64) -> Lab {
        Lab::new(
            LabId(id),
            LabParams {
                economic_value,
                planned_usage,
                base_audit_coefficient: 1.0,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn config() -> ScenarioConfig {
        ScenarioConfig {
            flop_threshold: 1e25,
            ..Default::default()
        }
    }

    #[test]
    fn test_below_threshold_labs_run_untouched() {
        let mut labs = vec![lab(1, 100.0, 0.5e25)];
        let mut market = PermitMarket::new(0);
        let auditor = Auditor::new(AuditPolicy {
            base_prob: 1.0,
            high_prob: 1.0,
            ..Default::default()
        })
        .unwrap();
        let mut rng = SimRng::seed_from_u64(42);

        let outcome = execute_step(&mut labs, &mut market, &auditor, &config(), &mut rng);
        let agent = &outcome.agents[0];
        assert_eq!(agent.usage, UsageClass::BelowThreshold);
        assert!(agent.ran);
        assert!(!agent.audited);
        assert_eq!(agent.realized_excess, 0.0);
    }

    #[test]
    fn test_permitted_lab_is_compliant_and_runs() {
        let mut labs = vec![lab(1, 100.0, 2e25)];
        let mut market = PermitMarket::new(5);
        let auditor = Auditor::new(AuditPolicy::default()).unwrap();
        let mut rng = SimRng::seed_from_u64(42);

        let outcome = execute_step(&mut labs, &mut market, &auditor, &config(), &mut rng);
        let agent = &outcome.agents[0];
        assert_eq!(agent.permits_allocated, 1);
        assert_eq!(agent.usage, UsageClass::Permitted);
        assert!(agent.compliant);
        assert!(agent.ran);
        assert_eq!(labs[0].dynamics().cumulative_capability, 1.0);
    }

    #[test]
    fn test_unenforced_lab_without_permit_violates() {
        let mut labs = vec![lab(1, 100.0, 2e25), lab(2, 50.0, 2e25)];
        let mut market = PermitMarket::new(1);
        let auditor = Auditor::new(AuditPolicy {
            base_prob: 0.0,
            high_prob: 0.0,
            ..Default::default()
        })
        .unwrap();
        let mut rng = SimRng::seed_from_u64(42);

        let outcome = execute_step(&mut labs, &mut market, &auditor, &config(), &mut rng);
        assert_eq!(outcome.clearing_price, 100.0);
        let loser = outcome.agent(LabId(2)).unwrap();
        assert_eq!(loser.usage, UsageClass::Violating);
        assert!(loser.ran);
        assert_eq!(loser.realized_excess, 2e25);
    }

    #[test]
    fn test_classification_is_pure() {
        let mut l = lab(1, 100.0, 2e25);
        l.set_compliant(false);
        let first = classify_usage(&l, 1e25, None);
        let second = classify_usage(&l, 1e25, None);
        assert_eq!(first, second);
        assert_eq!(first, (UsageClass::Violating, 2e25));

        l.set_compliant(true);
        assert_eq!(classify_usage(&l, 1e25, None), (UsageClass::Deterred, 0.0));
        l.assign_permits(1);
        assert_eq!(classify_usage(&l, 1e25, None), (UsageClass::Permitted, 0.0));
    }

    #[test]
    fn test_collateral_never_carries_over() {
        let mut labs = vec![lab(1, 100.0, 2e25), lab(2, 100.0, 2e25)];
        let mut market = PermitMarket::new(1);
        let auditor = Auditor::new(AuditPolicy::default()).unwrap();
        let cfg = ScenarioConfig {
            collateral_amount: 25.0,
            ..config()
        };
        let mut rng = SimRng::seed_from_u64(42);

        for _ in 0..5 {
            let outcome = execute_step(&mut labs, &mut market, &auditor, &cfg, &mut rng);
            for (lab, agent) in labs.iter().zip(&outcome.agents) {
                assert_eq!(lab.step_state().collateral_posted, 0.0);
                assert_eq!(agent.collateral_posted, 25.0);
                let returned = if agent.collateral_seized { 0.0 } else { 25.0 };
                assert_eq!(agent.collateral_refunded, returned);
            }
        }
    }

    #[test]
    fn test_empty_population() {
        let mut labs: Vec<Lab> = Vec::new();
        let mut market = PermitMarket::new(3);
        let auditor = Auditor::new(AuditPolicy::default()).unwrap();
        let mut rng = SimRng::seed_from_u64(42);
        let outcome = execute_step(&mut labs, &mut market, &auditor, &config(), &mut rng);
        assert!(outcome.agents.is_empty());
        assert_eq!(outcome.clearing_price, 0.0);
        assert_eq!(outcome.compliance_rate(), 0.0);
    }
}
