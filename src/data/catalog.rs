use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::loader::load_processed_curve;
use super::model::{CurveMatrix, FixedVector};
use super::resample::CurveResampler;
use crate::error::CurveError;

/// File-name prefix used by the light-curve exports.
pub const CURVE_PREFIX: &str = "curva_luz_";

// ---------------------------------------------------------------------------
// Entity naming
// ---------------------------------------------------------------------------

/// Derive the entity name from a file path: the stem without [`CURVE_PREFIX`].
pub fn entity_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.strip_prefix(CURVE_PREFIX).unwrap_or(stem).to_string())
}

/// File name a processed curve is stored under.
pub fn processed_file_name(name: &str) -> String {
    format!("{CURVE_PREFIX}{name}.csv")
}

/// All files in `dir` with one of `extensions`, as `(entity, path)` pairs
/// sorted by entity name.
pub fn list_entities(dir: &Path, extensions: &[&str]) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !extensions.contains(&ext.as_str()) {
            continue;
        }
        if let Some(name) = entity_name(&path) {
            entries.push((name, path));
        }
    }
    entries.sort();
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Train / test allow-lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit allow-lists deciding which collection each entity belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitPlan {
    pub train: BTreeSet<String>,
    pub test: BTreeSet<String>,
}

impl SplitPlan {
    pub fn new<I, J, S>(train: I, test: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SplitPlan {
            train: train.into_iter().map(Into::into).collect(),
            test: test.into_iter().map(Into::into).collect(),
        }
    }

    /// `None` for names on neither list. Train wins if a name is on both.
    pub fn assign(&self, name: &str) -> Option<Split> {
        if self.train.contains(name) {
            Some(Split::Train)
        } else if self.test.contains(name) {
            Some(Split::Test)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Collection loading
// ---------------------------------------------------------------------------

/// Load every processed curve in `dir`, resample it, and stack the results in
/// sorted entity order. Curves that cannot be read, lack a `brillo` column or
/// have fewer than two rows are skipped with a warning.
pub fn load_collection(dir: &Path, resampler: &CurveResampler) -> Result<CurveMatrix> {
    let mut vectors: Vec<FixedVector> = Vec::new();
    for (name, path) in list_entities(dir, &["csv"])? {
        let curve = match load_processed_curve(&path, &name) {
            Ok(Some(curve)) => curve,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("{name}: {e:#}, skipping");
                continue;
            }
        };
        match resampler.resample(&curve) {
            Ok(v) => vectors.push(v),
            Err(e) => log::warn!("{name}: {e}, skipping"),
        }
    }
    if vectors.is_empty() {
        return Err(CurveError::EmptyCollection {
            collection: dir.display().to_string(),
        }
        .into());
    }
    log::info!("Loaded {} curves from {}", vectors.len(), dir.display());
    Ok(CurveMatrix::from_vectors(vectors)?)
}

/// Re-derive identities for rows that were stored without them: sort the
/// names and pair the i-th name with row i.
pub fn attach_sorted_identities(
    mut names: Vec<String>,
    values: ndarray::Array2<f64>,
) -> Result<CurveMatrix, CurveError> {
    names.sort();
    CurveMatrix::with_names(names, values)
}
