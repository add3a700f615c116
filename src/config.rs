use crate::error::ConfigError;

/// Parameters of reference table construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Candidates kept per target bin before removing neighbouring bins.
    pub max_candidates_initial: usize,
    /// Candidates kept per target bin after removing neighbouring bins.
    pub max_candidates_final: usize,
    /// Largest per-sample squared differences dropped from each distance.
    pub ignore_top_k: usize,
    /// Starting cutoff for calibration.
    pub cutoff_seed: f64,
    /// Number of calibration rounds.
    pub cutoff_rounds: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_candidates_initial: 250,
            max_candidates_final: 100,
            ignore_top_k: 0,
            cutoff_seed: 1_000_000.0,
            cutoff_rounds: 3,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("max candidates initial", self.max_candidates_initial)?;
        nonzero("max candidates final", self.max_candidates_final)?;
        nonzero("cutoff rounds", self.cutoff_rounds)?;
        if !(self.cutoff_seed.is_finite() && self.cutoff_seed > 0.0) {
            return Err(ConfigError::InvalidCutoffSeed(self.cutoff_seed));
        }
        Ok(())
    }

    /// Checks the parameters against the population that is about to be used.
    pub fn validate_population(&self, samples: usize) -> Result<(), ConfigError> {
        self.validate()?;
        if samples < 2 {
            return Err(ConfigError::PopulationTooSmall(samples));
        }
        if self.ignore_top_k >= samples {
            return Err(ConfigError::IgnoreTooLarge {
                ignore: self.ignore_top_k,
                samples,
            });
        }
        Ok(())
    }
}

/// Parameters of sample scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreConfig {
    pub max_rounds: usize,
    /// Target bins with fewer usable reference bins are not scored.
    pub min_ref_bins: usize,
    /// Reference bins beyond this many are ignored.
    pub max_ref_bins: usize,
    /// Bins on each side of the target used for smoothing.
    pub smoothing_window: usize,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            min_ref_bins: 10,
            max_ref_bins: 100,
            smoothing_window: 5,
        }
    }
}

impl ScoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("max rounds", self.max_rounds)?;
        nonzero("min reference bins", self.min_ref_bins)?;
        nonzero("max reference bins", self.max_ref_bins)?;
        nonzero("smoothing window", self.smoothing_window)?;
        if self.min_ref_bins > self.max_ref_bins {
            return Err(ConfigError::ReferenceBinRange {
                min: self.min_ref_bins,
                max: self.max_ref_bins,
            });
        }
        Ok(())
    }
}

fn nonzero(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroCount { name })
    } else {
        Ok(())
    }
}
