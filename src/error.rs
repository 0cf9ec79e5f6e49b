use thiserror::Error;

/// Main error type for the Convoy launcher
#[derive(Debug, Error)]
pub enum ConvoyError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("Dependency cycle involving unit '{0}'")]
    DependencyCycle(String),

    // Startup-phase errors
    #[error("Dependency '{dependency}' of unit '{unit}' did not become running: {reason}")]
    DependencyTimeout {
        unit: String,
        dependency: String,
        reason: String,
    },

    #[error("Failed to spawn unit '{0}': {1}")]
    SpawnError(String, String),

    #[error("Unit '{0}' did not become ready within {1} seconds")]
    ReadinessTimeout(String, u64),

    // Run-phase and shutdown errors
    #[error("Failed to signal unit {0}: {1}")]
    SignalError(String, String),

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Convoy operations
pub type Result<T> = std::result::Result<T, ConvoyError>;
