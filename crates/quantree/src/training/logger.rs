//! Training progress logging.
//!
//! [`TrainingLogger`] turns trainer milestones into `tracing` events under the
//! `quantree::training` target. The configured [`Verbosity`] decides which
//! milestones are emitted at all; the subscriber's filter decides what is
//! printed.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// How much a trainer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// No events.
    #[default]
    Silent,
    /// Warnings only.
    Warning,
    /// Start / finish summaries.
    Info,
    /// Per-round and per-tree detail.
    Debug,
}

/// Emits training milestones for one model.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    model: &'static str,
    started: Option<Instant>,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity, model: &'static str) -> Self {
        Self {
            verbosity,
            model,
            started: None,
        }
    }

    #[inline]
    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start_training(&mut self, n_samples: usize, n_features: usize, n_rounds: usize) {
        self.started = Some(Instant::now());
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                target: "quantree::training",
                model = self.model,
                n_samples,
                n_features,
                n_rounds,
                "training started"
            );
        }
    }

    /// Per-round metric, e.g. boosting log loss.
    pub fn log_round(&self, round: usize, metric: &str, value: f64) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(target: "quantree::training", model = self.model, round, metric, value, "round finished");
        }
    }

    pub fn log_tree(&self, tree_idx: usize, n_leaves: usize, depth: usize) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(target: "quantree::training", model = self.model, tree_idx, n_leaves, depth, "tree grown");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(target: "quantree::training", model = self.model, "{message}");
        }
    }

    pub fn finish_training(&mut self, n_trees: usize) {
        let elapsed_ms = self.started.take().map_or(0.0, |t| t.elapsed().as_secs_f64() * 1e3);
        if self.enabled(Verbosity::Info) {
            tracing::info!(target: "quantree::training", model = self.model, n_trees, elapsed_ms, "training finished");
        }
    }
}
