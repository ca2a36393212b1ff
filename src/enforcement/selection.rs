//! Audit budget: choosing which triggered audits actually run

use rand::seq::index;

use crate::core::types::{LabId, SimRng};

/// A lab whose audit draw fired this step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditCandidate {
    /// Position of the lab in the step's lab list
    pub index: usize,
    pub lab_id: LabId,
    pub signal: f64,
}

/// How the regulator picks audits when more fire than it can afford
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Highest signal first, ties in input order
    Targeted,
    /// Uniform sample, signal ignored
    Random,
}

impl SelectionPolicy {
    pub fn for_regulator(signal_dependent: bool) -> Self {
        if signal_dependent {
            Self::Targeted
        } else {
            Self::Random
        }
    }
}

/// Trim `candidates` to at most `cap` audits
///
/// The result is returned in input order so audits resolve in the same
/// sequence as the lab list. Without a cap, or under it, nothing is dropped
/// and no randomness is consumed.
pub fn select_audits(
    candidates: Vec<AuditCandidate>,
    cap: Option<usize>,
    policy: SelectionPolicy,
    rng: &mut SimRng,
) -> Vec<AuditCandidate> {
    let cap = match cap {
        Some(cap) if candidates.len() > cap => cap,
        _ => return candidates,
    };

    let mut chosen: Vec<usize> = match policy {
        SelectionPolicy::Targeted => {
            let mut ranked: Vec<usize> = (0..candidates.len()).collect();
            ranked.sort_by(|&a, &b| candidates[b].signal.total_cmp(&candidates[a].signal));
            ranked.truncate(cap);
            ranked
        }
        SelectionPolicy::Random => index::sample(rng, candidates.len(), cap).into_vec(),
    };
    chosen.sort_unstable();

    tracing::debug!(
        "Audit budget exhausted: {} audits triggered, {} performed ({:?})",
        candidates.len(),
        cap,
        policy
    );

    chosen.into_iter().map(|i| candidates[i]).collect()
}
