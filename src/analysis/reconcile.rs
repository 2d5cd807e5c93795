use std::collections::HashMap;

use crate::data::model::{AnomalyLabel, AnomalyScore};
use crate::error::CurveError;

/// Both verdicts for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    pub name: String,
    pub reconstruction: AnomalyLabel,
    pub isolation: AnomalyLabel,
}

impl ComparisonRow {
    pub fn agrees(&self) -> bool {
        self.reconstruction == self.isolation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Matched entities, in the order of the reconstruction verdicts.
    pub rows: Vec<ComparisonRow>,
    /// Names present in only one of the two inputs.
    pub unmatched: Vec<String>,
}

impl Reconciliation {
    pub fn agreement_count(&self) -> usize {
        self.rows.iter().filter(|r| r.agrees()).count()
    }

    pub fn agreement_rate(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.agreement_count() as f64 / self.rows.len() as f64
        }
    }
}

/// Join two verdict sets by entity name (inner join).
///
/// Both sets must have the same cardinality; this is checked before joining.
/// Names missing from either side are dropped from `rows` and listed in
/// `unmatched`.
pub fn reconcile(
    reconstruction: &[AnomalyScore],
    isolation: &[AnomalyScore],
) -> Result<Reconciliation, CurveError> {
    if reconstruction.len() != isolation.len() {
        return Err(CurveError::CountMismatch {
            left: reconstruction.len(),
            right: isolation.len(),
        });
    }

    let by_name: HashMap<&str, AnomalyLabel> = isolation
        .iter()
        .map(|s| (s.name.as_str(), s.label))
        .collect();

    let mut rows = Vec::with_capacity(reconstruction.len());
    let mut unmatched = Vec::new();
    for s in reconstruction {
        match by_name.get(s.name.as_str()) {
            Some(&label) => rows.push(ComparisonRow {
                name: s.name.clone(),
                reconstruction: s.label,
                isolation: label,
            }),
            None => unmatched.push(s.name.clone()),
        }
    }
    let matched: std::collections::HashSet<&str> =
        reconstruction.iter().map(|s| s.name.as_str()).collect();
    unmatched.extend(
        isolation
            .iter()
            .filter(|s| !matched.contains(s.name.as_str()))
            .map(|s| s.name.clone()),
    );

    for name in &unmatched {
        log::warn!("{name}: present in only one result set, dropped from comparison");
    }
    Ok(Reconciliation { rows, unmatched })
}
