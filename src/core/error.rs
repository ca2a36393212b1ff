use thiserror::Error;

#[derive(Error, Debug)]
pub enum PermitError {
    #[error("{field} must be a probability in [0, 1], got {value}")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be non-negative, got {value}")]
    NegativeValue { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositiveValue { field: &'static str, value: f64 },

    #[error("{field} range is inverted: min {min} > max {max}")]
    InvertedRange { field: &'static str, min: f64, max: f64 },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, PermitError>;

/// Check that a value is a probability
pub fn ensure_probability(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PermitError::ProbabilityOutOfRange { field, value })
    }
}

/// Check that a value is finite and non-negative
pub fn ensure_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PermitError::NegativeValue { field, value })
    }
}

/// Check that a value is finite and strictly positive
pub fn ensure_positive(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PermitError::NonPositiveValue { field, value })
    }
}

/// Check a `min..=max` sampling range
pub fn ensure_range(field: &'static str, min: f64, max: f64) -> Result<()> {
    ensure_non_negative(field, min)?;
    ensure_non_negative(field, max)?;
    if min > max {
        return Err(PermitError::InvertedRange { field, min, max });
    }
    Ok(())
}
