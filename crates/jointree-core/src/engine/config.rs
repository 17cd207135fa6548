//! Triangulation configuration.

use crate::engine::errors::InferenceError;
use crate::engine::graph::NodeId;

/// Default relative slack for almost- and quasi-simplicial eliminations.
///
/// An almost-simplicial node is eliminated early only if its log-weight does
/// not exceed the largest clique log-weight created so far by more than
/// `ln(1 + threshold)`. With `0.0` such an elimination may never widen the
/// current tree width.
pub const DEFAULT_WEIGHT_THRESHOLD: f64 = 0.0;

/// Default bound on `missing / present` neighbour pairs for quasi-simplicial nodes.
pub const DEFAULT_QUASI_RATIO: f64 = 0.02;

/// Unconstrained elimination heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Heuristic {
    /// Simplicial first, then almost-simplicial, quasi-simplicial, then minimum weight.
    #[default]
    Default,
    /// Minimum number of fill-in edges.
    MinFill,
    /// Minimum clique weight (product of domain sizes).
    MinWeight,
}

/// Which elimination sequence strategy drives a triangulation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EliminationStrategyKind {
    /// Simplicial-first heuristic.
    #[default]
    Default,
    /// Greedy minimum fill-in.
    MinFill,
    /// Greedy minimum weight.
    MinWeight,
    /// Externally fixed total order.
    Ordered(Vec<NodeId>),
    /// Ordered blocks; any order inside a block, chosen by `within`.
    PartialOrdered {
        /// Blocks eliminated one after the other.
        blocks: Vec<Vec<NodeId>>,
        /// Heuristic used inside each block.
        within: Heuristic,
    },
}

impl From<Heuristic> for EliminationStrategyKind {
    fn from(heuristic: Heuristic) -> Self {
        match heuristic {
            Heuristic::Default => Self::Default,
            Heuristic::MinFill => Self::MinFill,
            Heuristic::MinWeight => Self::MinWeight,
        }
    }
}

/// Configuration for a triangulation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriangulationConfig {
    /// Elimination strategy.
    pub strategy: EliminationStrategyKind,
    /// Relative weight slack for almost- and quasi-simplicial nodes, `>= 0`.
    pub almost_simplicial_threshold: f64,
    /// Upper bound (exclusive) on `missing / present` neighbour pairs, `>= 0`.
    pub quasi_simplicial_ratio: f64,
    /// Drop fill edges that no clique needs after the main pass.
    pub enforce_minimality: bool,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            strategy: EliminationStrategyKind::Default,
            almost_simplicial_threshold: DEFAULT_WEIGHT_THRESHOLD,
            quasi_simplicial_ratio: DEFAULT_QUASI_RATIO,
            enforce_minimality: false,
        }
    }
}

impl TriangulationConfig {
    /// Default configuration with the given strategy.
    pub fn with_strategy(strategy: EliminationStrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Returns a copy with minimality enforcement switched on or off.
    pub fn minimal(mut self, enforce: bool) -> Self {
        self.enforce_minimality = enforce;
        self
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        if !self.almost_simplicial_threshold.is_finite() || self.almost_simplicial_threshold < 0.0
        {
            return Err(InferenceError::InvalidConfig(
                "almost_simplicial_threshold must be finite and >= 0".into(),
            ));
        }
        if !self.quasi_simplicial_ratio.is_finite() || self.quasi_simplicial_ratio < 0.0 {
            return Err(InferenceError::InvalidConfig(
                "quasi_simplicial_ratio must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TriangulationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_negative_or_non_finite_parameters() {
        let mut config = TriangulationConfig::default();
        config.almost_simplicial_threshold = -1.0;
        assert!(matches!(
            config.validate(),
            Err(InferenceError::InvalidConfig(_))
        ));

        let mut config = TriangulationConfig::default();
        config.quasi_simplicial_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn heuristic_converts_to_strategy_kind() {
        assert_eq!(
            EliminationStrategyKind::from(Heuristic::MinFill),
            EliminationStrategyKind::MinFill
        );
        let config = TriangulationConfig::with_strategy(Heuristic::MinWeight.into()).minimal(true);
        assert_eq!(config.strategy, EliminationStrategyKind::MinWeight);
        assert!(config.enforce_minimality);
    }
}
