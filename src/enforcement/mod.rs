//! Enforcement: the regulator's audit and penalty model

pub mod auditor;
pub mod selection;

pub use auditor::{AuditResolution, Auditor};
pub use selection::{select_audits, AuditCandidate, SelectionPolicy};
