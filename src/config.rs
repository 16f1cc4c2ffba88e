//! Solver configuration.
//!
//! Every strategy the search can be configured with is a closed enum,
//! parsed once here (from JSON or from CLI strings). An unknown name is
//! rejected before any search starts.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Move families of the neighborhood engine
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodKind {
    SwapIntraRoute,
    SwapInterRoute,
    TwoEdgeExchange,
    Insert,
    ReplaceDelta,
    ReplaceProfit,
}

impl NeighborhoodKind {
    pub const ALL: [NeighborhoodKind; 6] = [
        NeighborhoodKind::SwapIntraRoute,
        NeighborhoodKind::SwapInterRoute,
        NeighborhoodKind::TwoEdgeExchange,
        NeighborhoodKind::Insert,
        NeighborhoodKind::ReplaceDelta,
        NeighborhoodKind::ReplaceProfit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NeighborhoodKind::SwapIntraRoute => "swap_intra_route",
            NeighborhoodKind::SwapInterRoute => "swap_inter_route",
            NeighborhoodKind::TwoEdgeExchange => "two_edge_exchange",
            NeighborhoodKind::Insert => "insert",
            NeighborhoodKind::ReplaceDelta => "replace_delta",
            NeighborhoodKind::ReplaceProfit => "replace_profit",
        }
    }
}

impl FromStr for NeighborhoodKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        NeighborhoodKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SolverError::UnknownStrategy {
                kind: "neighborhood",
                name: s.to_string(),
            })
    }
}

impl fmt::Display for NeighborhoodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How evaluated moves are turned into a selection
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    /// Evaluate every candidate, then pick the best-ranked feasible one
    BestImprovement,
    /// Stop at the first candidate that improves and is feasible
    FirstImprovement,
}

impl FromStr for EvaluationStrategy {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best_improvement" | "best" => Ok(EvaluationStrategy::BestImprovement),
            "first_improvement" | "first" => Ok(EvaluationStrategy::FirstImprovement),
            _ => Err(SolverError::UnknownStrategy {
                kind: "evaluation strategy",
                name: s.to_string(),
            }),
        }
    }
}

/// Full enumeration of candidates or random sampling
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    Exhaustive,
    Sampled,
}

impl FromStr for DiscoveryMode {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exhaustive" => Ok(DiscoveryMode::Exhaustive),
            "sampled" => Ok(DiscoveryMode::Sampled),
            _ => Err(SolverError::UnknownStrategy {
                kind: "discovery mode",
                name: s.to_string(),
            }),
        }
    }
}

/// Scoring function of the greedy construction
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attractiveness {
    /// `profit^a / (service + travel)`
    Base,
    /// Base plus nearby profitable tasks divided by `b`
    Density,
    /// Base minus the detour to the next pending main task
    MainDetour,
    /// Both extra terms
    DensityMainDetour,
}

impl Attractiveness {
    pub fn uses_density(&self) -> bool {
        matches!(self, Attractiveness::Density | Attractiveness::DensityMainDetour)
    }

    pub fn uses_detour(&self) -> bool {
        matches!(self, Attractiveness::MainDetour | Attractiveness::DensityMainDetour)
    }
}

impl FromStr for Attractiveness {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Attractiveness::Base),
            "density" => Ok(Attractiveness::Density),
            "main_detour" => Ok(Attractiveness::MainDetour),
            "density_main_detour" => Ok(Attractiveness::DensityMainDetour),
            _ => Err(SolverError::UnknownStrategy {
                kind: "attractiveness function",
                name: s.to_string(),
            }),
        }
    }
}

/// Where main tasks come from before the greedy fill
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Each main task goes to its own day, spread over cohorts
    TaskDay,
    /// Supplied from outside (e.g. an exact model)
    External,
    /// Plan without main tasks
    None,
}

impl FromStr for AllocationStrategy {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task_day" => Ok(AllocationStrategy::TaskDay),
            "external" => Ok(AllocationStrategy::External),
            "none" => Ok(AllocationStrategy::None),
            _ => Err(SolverError::UnknownStrategy {
                kind: "allocation strategy",
                name: s.to_string(),
            }),
        }
    }
}

/// One (attractiveness, a, b) tuple of the construction sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstructionParams {
    pub attractiveness: Attractiveness,
    /// Profit exponent
    pub a: f64,
    /// Normalizer of the nearby-task count
    pub b: f64,
    /// Score lost per second of detour to the next pending main task
    #[serde(default = "default_detour_weight")]
    pub detour_weight: f64,
}

fn default_detour_weight() -> f64 {
    1.0
}

impl ConstructionParams {
    pub fn new(attractiveness: Attractiveness, a: f64, b: f64) -> Self {
        ConstructionParams {
            attractiveness,
            a,
            b,
            detour_weight: default_detour_weight(),
        }
    }

    pub fn with_detour_weight(mut self, weight: f64) -> Self {
        self.detour_weight = weight;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborhoodSettings {
    pub discovery: DiscoveryMode,
    /// Candidates drawn per discovery in sampled mode, and retries of a random move
    pub sample_attempts: usize,
    /// Cap on unused tasks considered by insertion
    pub insert_sample_limit: usize,
    /// Cap on unused tasks considered by replacement
    pub replace_sample_limit: usize,
    /// Route pairs drawn by the inter-route swap
    pub inter_route_pair_samples: usize,
}

impl Default for NeighborhoodSettings {
    fn default() -> Self {
        NeighborhoodSettings {
            discovery: DiscoveryMode::Exhaustive,
            sample_attempts: 50,
            insert_sample_limit: 250,
            replace_sample_limit: 100,
            inter_route_pair_samples: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    /// k: tasks dropped by the random removal
    pub removal_count: usize,
    /// m: length of the removed block
    pub block_size: usize,
    /// Routes a block is cut from
    pub block_routes: usize,
    /// Non-improving iterations before returning to the best solution
    pub restart_after: usize,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        PerturbationConfig {
            removal_count: 3,
            block_size: 3,
            block_routes: 2,
            restart_after: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    pub variants: Vec<ConstructionParams>,
    pub allocation: AllocationStrategy,
    /// Travel time under which two tasks count as neighbours
    pub proximity_radius: i64,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        ConstructionConfig {
            variants: vec![
                ConstructionParams::new(Attractiveness::Base, 1.0, 1.0),
                ConstructionParams::new(Attractiveness::Density, 1.5, 10.0),
                ConstructionParams::new(Attractiveness::DensityMainDetour, 2.0, 5.0),
            ],
            allocation: AllocationStrategy::TaskDay,
            proximity_radius: 600,
        }
    }
}

/// Complete solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Seed of the single random generator threaded through the search
    pub seed: u64,
    /// Wall-clock budget of the perturbation loop
    pub time_limit_secs: f64,
    /// Optional cap on perturbation iterations
    pub max_iterations: Option<usize>,
    pub evaluation: EvaluationStrategy,
    /// Descent order
    pub neighborhoods: Vec<NeighborhoodKind>,
    pub neighborhood: NeighborhoodSettings,
    pub perturbation: PerturbationConfig,
    pub construction: ConstructionConfig,
    /// Guard on full passes over the neighborhood list
    pub max_local_search_passes: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            seed: 42,
            time_limit_secs: 10.0,
            max_iterations: None,
            evaluation: EvaluationStrategy::BestImprovement,
            neighborhoods: vec![
                NeighborhoodKind::Insert,
                NeighborhoodKind::ReplaceProfit,
                NeighborhoodKind::SwapIntraRoute,
                NeighborhoodKind::TwoEdgeExchange,
                NeighborhoodKind::SwapInterRoute,
                NeighborhoodKind::ReplaceDelta,
            ],
            neighborhood: NeighborhoodSettings::default(),
            perturbation: PerturbationConfig::default(),
            construction: ConstructionConfig::default(),
            max_local_search_passes: 100,
        }
    }
}

impl SolverConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: SolverConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no search could run with
    pub fn validate(&self) -> Result<()> {
        if self.neighborhoods.is_empty() {
            return Err(SolverError::InvalidConfig(
                "at least one neighborhood is required".to_string(),
            ));
        }
        if self.construction.variants.is_empty() {
            return Err(SolverError::InvalidConfig(
                "at least one construction variant is required".to_string(),
            ));
        }
        for params in &self.construction.variants {
            if !params.a.is_finite() || !params.b.is_finite() || params.b <= 0.0 {
                return Err(SolverError::InvalidConfig(format!(
                    "construction parameters a={} b={} are invalid (b must be positive)",
                    params.a, params.b
                )));
            }
            if !params.detour_weight.is_finite() || params.detour_weight < 0.0 {
                return Err(SolverError::InvalidConfig(format!(
                    "detour_weight {} must be a non-negative number",
                    params.detour_weight
                )));
            }
        }
        if self.time_limit_secs.is_nan() || self.time_limit_secs < 0.0 {
            return Err(SolverError::InvalidConfig(
                "time_limit_secs must be non-negative".to_string(),
            ));
        }
        if self.neighborhood.sample_attempts == 0 {
            return Err(SolverError::InvalidConfig(
                "sample_attempts must be positive".to_string(),
            ));
        }
        if self.perturbation.restart_after == 0 {
            return Err(SolverError::InvalidConfig(
                "restart_after must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.neighborhood.insert_sample_limit, 250);
        assert_eq!(config.neighborhood.replace_sample_limit, 100);
    }

    #[test]
    fn test_parse_neighborhood_names() {
        for kind in NeighborhoodKind::ALL {
            assert_eq!(kind.as_str().parse::<NeighborhoodKind>().unwrap(), kind);
        }
        let err = "three_opt".parse::<NeighborhoodKind>().unwrap_err();
        assert!(matches!(err, SolverError::UnknownStrategy { kind: "neighborhood", .. }));
    }

    #[test]
    fn test_unknown_attractiveness_fails() {
        assert!("greedy".parse::<Attractiveness>().is_err());
        assert_eq!("density".parse::<Attractiveness>().unwrap(), Attractiveness::Density);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SolverConfig::from_json_str(
            r#"{"seed": 7, "neighborhoods": ["insert", "swap_intra_route"], "evaluation": "first_improvement"}"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.neighborhoods.len(), 2);
        assert_eq!(config.evaluation, EvaluationStrategy::FirstImprovement);
        assert_eq!(config.perturbation.removal_count, 3);
    }

    #[test]
    fn test_json_with_unknown_neighborhood_fails() {
        let result = SolverConfig::from_json_str(r#"{"neighborhoods": ["or_opt"]}"#);
        assert!(matches!(result, Err(SolverError::Json(_))));
    }

    #[test]
    fn test_zero_b_rejected() {
        let mut config = SolverConfig::default();
        config.construction.variants = vec![ConstructionParams::new(Attractiveness::Density, 1.0, 0.0)];
        assert!(matches!(config.validate(), Err(SolverError::InvalidConfig(_))));
    }

    #[test]
    fn test_detour_weight_defaults_and_validation() {
        let config = SolverConfig::from_json_str(
            r#"{"construction": {"variants": [{"attractiveness": "main_detour", "a": 1.0, "b": 1.0}]}}"#,
        )
        .unwrap();
        assert_eq!(config.construction.variants[0].detour_weight, 1.0);

        let mut config = SolverConfig::default();
        config.construction.variants =
            vec![ConstructionParams::new(Attractiveness::MainDetour, 1.0, 1.0).with_detour_weight(-0.5)];
        assert!(matches!(config.validate(), Err(SolverError::InvalidConfig(_))));
    }
}
