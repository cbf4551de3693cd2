//! The three classifier families.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::config::{BoostingConfig, DecisionTreeConfig, ForestConfig};
use super::ensemble::{EnsembleKind, FittedEnsemble};
use super::{ModelState, PersistError, TreeClassifier};
use crate::training::{
    DecisionTreeTrainer, EnsembleTrainer, GradientBoostingTrainer, ParamValidationError, RandomForestTrainer,
};

/// On-disk form of a fitted classifier. Compiled circuits are not stored.
#[derive(Serialize, Deserialize)]
struct Snapshot<C> {
    kind: EnsembleKind,
    config: C,
    fitted: FittedEnsemble,
}

fn snapshot_to_json<C: Serialize>(kind: EnsembleKind, config: &C, state: &ModelState) -> Result<String, PersistError> {
    #[derive(Serialize)]
    struct SnapshotRef<'a, C> {
        kind: EnsembleKind,
        config: &'a C,
        fitted: &'a FittedEnsemble,
    }
    let fitted = state.fitted().ok_or(PersistError::NotFitted)?;
    Ok(serde_json::to_string(&SnapshotRef { kind, config, fitted })?)
}

fn snapshot_from_json<C: DeserializeOwned>(
    kind: EnsembleKind,
    json: &str,
) -> Result<(C, ModelState), PersistError> {
    #[derive(Deserialize)]
    struct KindOnly {
        kind: EnsembleKind,
    }

    // Configs differ per kind, so check the tag before the full snapshot.
    let KindOnly { kind: found } = serde_json::from_str(json)?;
    if found != kind {
        return Err(PersistError::KindMismatch { expected: kind, found });
    }
    let snapshot: Snapshot<C> = serde_json::from_str(json)?;
    if snapshot.fitted.kind() != kind {
        return Err(PersistError::KindMismatch {
            expected: kind,
            found: snapshot.fitted.kind(),
        });
    }
    Ok((snapshot.config, ModelState::from_fitted(snapshot.fitted)))
}

// =============================================================================
// DecisionTreeClassifier
// =============================================================================

/// A single quantized CART tree.
#[derive(Debug, Default)]
pub struct DecisionTreeClassifier {
    config: DecisionTreeConfig,
    state: ModelState,
}

impl DecisionTreeClassifier {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            state: ModelState::default(),
        }
    }

    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        snapshot_to_json(EnsembleKind::DecisionTree, &self.config, &self.state)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let (config, state) = snapshot_from_json(EnsembleKind::DecisionTree, json)?;
        Ok(Self { config, state })
    }
}

impl TreeClassifier for DecisionTreeClassifier {
    fn kind(&self) -> EnsembleKind {
        EnsembleKind::DecisionTree
    }

    fn n_bits(&self) -> u8 {
        self.config.n_bits
    }

    fn validate_config(&self) -> Result<(), ParamValidationError> {
        self.config.validate()
    }

    fn trainer(&self) -> Box<dyn EnsembleTrainer> {
        Box::new(
            DecisionTreeTrainer::new(self.config.tree.clone(), self.config.seed).with_verbosity(self.config.verbosity),
        )
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

// =============================================================================
// RandomForestClassifier
// =============================================================================

/// Bootstrap-aggregated quantized trees.
#[derive(Debug, Default)]
pub struct RandomForestClassifier {
    config: ForestConfig,
    state: ModelState,
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            state: ModelState::default(),
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        snapshot_to_json(EnsembleKind::RandomForest, &self.config, &self.state)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let (config, state) = snapshot_from_json(EnsembleKind::RandomForest, json)?;
        Ok(Self { config, state })
    }
}

impl TreeClassifier for RandomForestClassifier {
    fn kind(&self) -> EnsembleKind {
        EnsembleKind::RandomForest
    }

    fn n_bits(&self) -> u8 {
        self.config.n_bits
    }

    fn validate_config(&self) -> Result<(), ParamValidationError> {
        self.config.validate()
    }

    fn trainer(&self) -> Box<dyn EnsembleTrainer> {
        let c = &self.config;
        Box::new(
            RandomForestTrainer::new(c.tree.clone(), c.n_estimators, c.bootstrap, c.seed)
                .with_threads(c.n_threads)
                .with_verbosity(c.verbosity),
        )
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

// =============================================================================
// XGBClassifier
// =============================================================================

/// Gradient-boosted quantized trees.
#[derive(Debug, Default)]
pub struct XGBClassifier {
    config: BoostingConfig,
    state: ModelState,
}

impl XGBClassifier {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            state: ModelState::default(),
        }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        snapshot_to_json(EnsembleKind::GradientBoosting, &self.config, &self.state)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let (config, state) = snapshot_from_json(EnsembleKind::GradientBoosting, json)?;
        Ok(Self { config, state })
    }
}

impl TreeClassifier for XGBClassifier {
    fn kind(&self) -> EnsembleKind {
        EnsembleKind::GradientBoosting
    }

    fn n_bits(&self) -> u8 {
        self.config.n_bits
    }

    fn validate_config(&self) -> Result<(), ParamValidationError> {
        self.config.validate()
    }

    fn trainer(&self) -> Box<dyn EnsembleTrainer> {
        Box::new(
            GradientBoostingTrainer::new(self.config.boosting_params(), self.config.seed)
                .with_verbosity(self.config.verbosity),
        )
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}
