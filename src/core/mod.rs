pub mod config;
pub mod error;
pub mod types;

pub use config::{AuditPolicy, LabGenerationConfig, MarketConfig, ScenarioConfig};
pub use error::{PermitError, Result};
pub use types::{LabId, SimRng, Step};
