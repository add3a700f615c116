/// Invalid or inconsistent parameters, detected before any computation starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },

    #[error("cutoff seed must be a positive finite number, got {0}")]
    InvalidCutoffSeed(f64),

    #[error("min reference bins ({min}) exceeds max reference bins ({max})")]
    ReferenceBinRange { min: usize, max: usize },

    #[error("reference population needs at least 2 samples, got {0}")]
    PopulationTooSmall(usize),

    #[error("cannot ignore the {ignore} largest differences with only {samples} samples")]
    IgnoreTooLarge { ignore: usize, samples: usize },
}

/// Problems with the input data itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("unknown chromosome label '{0}'")]
    UnknownChromosome(String),

    #[error("no target bin has a best candidate below cutoff {cutoff} (calibration round {round})")]
    EmptyCalibration { cutoff: f64, round: usize },

    #[error("reference table is malformed: {0}")]
    MalformedReference(String),
}
