/// Analysis layer: fit-once / apply-many transforms and the two scorers.
///
/// ```text
///   CurveMatrix
///        │
///        ▼
///   ┌─────────────┐
///   │ standardize  │  per-column mean 0 / variance 1
///   └─────────────┘
///        │                     │
///        ▼                     ▼
///   ┌──────────┐        ┌─────────────┐
///   │   pca     │        │ autoencoder  │  reconstruction error
///   └──────────┘        └─────────────┘
///        │                     │
///        ▼                     │
///   ┌──────────┐               │
///   │ isolation │               │
///   └──────────┘               │
///        │                     │
///        ▼                     ▼
///   ┌────────────────────────────┐
///   │         reconcile           │  join verdicts by entity name
///   └────────────────────────────┘
/// ```
pub mod autoencoder;
pub mod isolation;
pub mod pca;
pub mod reconcile;
pub mod standardize;

use crate::data::model::{AnomalyScore, CurveMatrix};
use crate::error::CurveError;

/// A fitted model that turns matrix rows into per-entity verdicts.
pub trait AnomalyScorer {
    fn method(&self) -> &'static str;

    fn score(&self, matrix: &CurveMatrix) -> Result<Vec<AnomalyScore>, CurveError>;
}

impl AnomalyScorer for autoencoder::Autoencoder {
    fn method(&self) -> &'static str {
        "autoencoder"
    }

    fn score(&self, matrix: &CurveMatrix) -> Result<Vec<AnomalyScore>, CurveError> {
        autoencoder::Autoencoder::score(self, matrix)
    }
}

impl AnomalyScorer for isolation::IsolationForest {
    fn method(&self) -> &'static str {
        "isolation forest"
    }

    fn score(&self, matrix: &CurveMatrix) -> Result<Vec<AnomalyScore>, CurveError> {
        isolation::IsolationForest::score(self, matrix)
    }
}

/// Score `matrix` and log how many entities were flagged.
pub fn score_and_report(
    scorer: &dyn AnomalyScorer,
    matrix: &CurveMatrix,
) -> Result<Vec<AnomalyScore>, CurveError> {
    let scores = scorer.score(matrix)?;
    let flagged: Vec<&str> = scores
        .iter()
        .filter(|s| s.label.is_anomalous())
        .map(|s| s.name.as_str())
        .collect();
    log::info!(
        "{}: {} of {} curves anomalous {:?}",
        scorer.method(),
        flagged.len(),
        scores.len(),
        flagged
    );
    Ok(scores)
}
