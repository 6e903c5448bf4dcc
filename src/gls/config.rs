//! GLS configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::local_search::ImprovementStrategy;

/// How perturbation targets are read from the gap between guided and true
/// distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelection {
    /// Most negative gap first: the edge the guide favors most.
    #[default]
    MostFavored,
    /// Largest gap first: the edge the guide penalizes most.
    MostPenalized,
}

/// Configuration for the guided local search loop.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_gls::gls::{GlsConfig, TargetSelection};
///
/// let config = GlsConfig::default()
///     .with_max_iterations(200)
///     .with_time_limit(Duration::from_secs(2))
///     .with_target_selection(TargetSelection::MostPenalized);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlsConfig {
    /// Maximum number of outer iterations.
    pub max_iterations: usize,

    /// Wall-clock budget, checked at the top of every outer iteration.
    #[serde(with = "duration_secs")]
    pub time_limit: Duration,

    /// Guide calls per outer iteration.
    pub perturbation_moves: usize,

    /// Edges targeted per guide call.
    pub targets_per_move: usize,

    /// Restart from the incumbent every this many outer iterations.
    /// 0 = never.
    pub restart_interval: usize,

    /// Improvement strategy of the full local-search passes.
    pub strategy: ImprovementStrategy,

    /// Which gap entries become perturbation targets. `None` defers to
    /// the guide's preference, then to [`TargetSelection::MostFavored`].
    pub target_selection: Option<TargetSelection>,
}

impl Default for GlsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            time_limit: Duration::from_secs(10),
            perturbation_moves: 1,
            targets_per_move: 5,
            restart_interval: 50,
            strategy: ImprovementStrategy::BestImprovement,
            target_selection: None,
        }
    }
}

impl GlsConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_perturbation_moves(mut self, n: usize) -> Self {
        self.perturbation_moves = n;
        self
    }

    pub fn with_targets_per_move(mut self, n: usize) -> Self {
        self.targets_per_move = n;
        self
    }

    pub fn with_restart_interval(mut self, n: usize) -> Self {
        self.restart_interval = n;
        self
    }

    pub fn with_strategy(mut self, strategy: ImprovementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_target_selection(mut self, selection: TargetSelection) -> Self {
        self.target_selection = Some(selection);
        self
    }

    /// The selection used with a guide that prefers `preferred`.
    pub fn resolve_selection(&self, preferred: Option<TargetSelection>) -> TargetSelection {
        self.target_selection.or(preferred).unwrap_or_default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.perturbation_moves == 0 {
            return Err("perturbation_moves must be at least 1".into());
        }
        if self.targets_per_move == 0 {
            return Err("targets_per_move must be at least 1".into());
        }
        Ok(())
    }
}

/// Serializes a [`Duration`] as fractional seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serializes an optional [`Duration`] as fractional seconds or `null`.
pub(crate) mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
