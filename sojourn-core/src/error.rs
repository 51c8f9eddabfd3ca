pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Ring buffer error: {0}")]
    RingError(String),
    #[error("AQM instance has been destroyed")]
    Destroyed,
}

/// Rejected parameters. Only raised while building an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Queue capacity must be non-zero")]
    ZeroCapacity,
    #[error("Queue capacity {0} exceeds the supported maximum")]
    CapacityTooLarge(usize),
    #[error("Target delay must be non-zero")]
    ZeroTarget,
    #[error("Interval must be non-zero")]
    ZeroInterval,
    #[error("Update period must be non-zero")]
    ZeroUpdatePeriod,
    #[error("Max burst allowance must be non-zero")]
    ZeroMaxBurst,
    #[error("Invalid thresholds, min_th: {min_th}, max_th: {max_th}")]
    InvalidThreshold { min_th: u32, max_th: u32 },
    #[error("Averaging weight exponent {0} is out of range")]
    InvalidWeight(u8),
    #[error("Inverse max probability {0} is out of range")]
    InvalidMaxProbInverse(u8),
    #[error("WRED needs at least one traffic class")]
    NoTrafficClass,
    #[error("WRED supports at most {max} traffic classes, got {0}", max = crate::algorithm::wred::MAX_TRAFFIC_CLASSES)]
    TooManyTrafficClasses(usize),
    #[error("Clock frequency must be non-zero")]
    ZeroClockRate,
    #[error("Unknown algorithm \"{0}\"")]
    UnknownAlgorithm(String),
    #[error("Failed to load config, {0}")]
    Load(String),
}
