//! Error types for Vigil.

use thiserror::Error;

/// Top-level error type for Vigil operations.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External collaborator failure
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors, raised at construction time only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Boss has no phases
    #[error("Phase table is empty")]
    EmptyPhaseTable,

    /// Phase thresholds must strictly decrease with the phase index
    #[error("Phase {index} threshold {threshold} is not below the previous threshold {previous}")]
    NonDescendingThreshold {
        /// 1-based phase index
        index: usize,
        /// Offending threshold
        threshold: f32,
        /// Threshold of the phase before it
        previous: f32,
    },

    /// Threshold outside (0, 1]
    #[error("Phase {index} threshold {threshold} is outside (0, 1]")]
    ThresholdOutOfRange {
        /// 1-based phase index
        index: usize,
        /// Offending threshold
        threshold: f32,
    },

    /// A phase allows no attack patterns
    #[error("Phase {index} has an empty attack pattern set")]
    EmptyPatternSet {
        /// 1-based phase index
        index: usize,
    },

    /// A phase references a pattern missing from the catalog
    #[error("Phase {index} references unknown pattern '{tag}'")]
    UnknownPattern {
        /// 1-based phase index
        index: usize,
        /// Pattern tag
        tag: String,
    },

    /// Special patterns may not appear in a phase's regular set
    #[error("Phase {index} lists special pattern '{tag}' in its regular set")]
    SpecialInPhaseSet {
        /// 1-based phase index
        index: usize,
        /// Pattern tag
        tag: String,
    },

    /// Two catalog entries share a tag
    #[error("Duplicate pattern tag '{0}'")]
    DuplicatePattern(String),

    /// A value that must be positive was not
    #[error("{field} must be positive, got {value}")]
    NotPositive {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f32,
    },

    /// A value that must be non-negative was not
    #[error("{field} must be non-negative, got {value}")]
    Negative {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f32,
    },

    /// A value below its allowed minimum
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f32,
        /// Smallest accepted value
        min: f32,
    },

    /// A probability outside [0, 1]
    #[error("{field} must be within [0, 1], got {value}")]
    NotAProbability {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f32,
    },

    /// A tick count that must be non-zero was zero
    #[error("{0} must be at least one tick")]
    ZeroTicks(&'static str),

    /// Text could not be parsed into a configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Transient failures reported by external collaborators.
///
/// These never escalate: the caller logs and retries on its next natural
/// re-request interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// Navigation could not find a route
    #[error("Destination unreachable")]
    Unreachable,

    /// Agent left its route
    #[error("Agent is off route")]
    OffRoute,

    /// A collision query failed
    #[error("Collision query failed: {0}")]
    QueryFailed(String),
}

/// Result type alias for Vigil operations.
pub type VigilResult<T> = Result<T, VigilError>;

/// Result type alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for port calls.
pub type PortResult<T> = Result<T, PortError>;

/// Checks that a value is strictly positive.
pub fn ensure_positive(field: &'static str, value: f32) -> ConfigResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

/// Checks that a value is zero or positive.
pub fn ensure_non_negative(field: &'static str, value: f32) -> ConfigResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

/// Checks that a value is finite and at least `min`.
pub fn ensure_at_least(field: &'static str, value: f32, min: f32) -> ConfigResult<()> {
    if value >= min && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::BelowMinimum { field, value, min })
    }
}

/// Checks that a value is a probability.
pub fn ensure_probability(field: &'static str, value: f32) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::NotAProbability { field, value })
    }
}

/// Checks that a tick count is non-zero.
pub fn ensure_ticks(field: &'static str, ticks: u64) -> ConfigResult<()> {
    if ticks == 0 {
        Err(ConfigError::ZeroTicks(field))
    } else {
        Ok(())
    }
}
