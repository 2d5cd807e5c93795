use std::fmt;

use ndarray::{Array2, ArrayView1};

use crate::error::CurveError;

// ---------------------------------------------------------------------------
// LightCurve – one star's brightness over time
// ---------------------------------------------------------------------------

/// A single light curve after loading.
///
/// `time` and `brightness` always have the same length. Brightness never holds
/// NaN once the loader has filled gaps; time may, since it is carried through
/// untouched and never used for interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurve {
    /// Entity name (file stem without the `curva_luz_` prefix).
    pub name: String,
    pub time: Vec<f64>,
    pub brightness: Vec<f64>,
}

impl LightCurve {
    pub fn new(name: impl Into<String>, time: Vec<f64>, brightness: Vec<f64>) -> Self {
        debug_assert_eq!(time.len(), brightness.len());
        LightCurve {
            name: name.into(),
            time,
            brightness,
        }
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.brightness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brightness.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FilteredCurve – a point subset of its source curve
// ---------------------------------------------------------------------------

/// Output of the outlier filter: the kept points plus the source indices that
/// were dropped, so the original can still be compared against the result.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredCurve {
    pub curve: LightCurve,
    /// Indices into the source curve, ascending.
    pub removed: Vec<usize>,
}

impl FilteredCurve {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

// ---------------------------------------------------------------------------
// FixedVector / CurveMatrix – fixed-length representation
// ---------------------------------------------------------------------------

/// A curve resampled onto a uniform `[0, 1]` grid of fixed length.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedVector {
    pub name: String,
    pub values: Vec<f64>,
}

/// Rows of equal width, one per entity, in insertion order.
///
/// The same type carries raw, standardized and projected matrices; each row
/// keeps the entity name it was built from so labels never need to be
/// reattached by position.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl CurveMatrix {
    /// Assemble a matrix from fixed vectors. All vectors must share one length.
    pub fn from_vectors(vectors: Vec<FixedVector>) -> Result<Self, CurveError> {
        let width = vectors.first().map(|v| v.values.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(vectors.len());
        let mut flat = Vec::with_capacity(vectors.len() * width);
        for v in vectors {
            if v.values.len() != width {
                return Err(CurveError::ShapeMismatch {
                    expected: width,
                    found: v.values.len(),
                });
            }
            names.push(v.name);
            flat.extend(v.values);
        }
        let values = Array2::from_shape_vec((names.len(), width), flat).map_err(|_| {
            CurveError::ShapeMismatch {
                expected: width,
                found: 0,
            }
        })?;
        Ok(CurveMatrix { names, values })
    }

    /// Pair an already-built matrix with its row names.
    pub fn with_names(names: Vec<String>, values: Array2<f64>) -> Result<Self, CurveError> {
        if names.len() != values.nrows() {
            return Err(CurveError::CountMismatch {
                left: names.len(),
                right: values.nrows(),
            });
        }
        Ok(CurveMatrix { names, values })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    /// Fail with `ShapeMismatch` unless the matrix has `expected` columns.
    pub fn check_width(&self, expected: usize) -> Result<(), CurveError> {
        if self.ncols() != expected {
            return Err(CurveError::ShapeMismatch {
                expected,
                found: self.ncols(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Anomaly verdicts
// ---------------------------------------------------------------------------

/// Discrete verdict, encoded on disk as `-1` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnomalyLabel {
    Anomalous,
    Normal,
}

impl AnomalyLabel {
    pub fn as_i8(self) -> i8 {
        match self {
            AnomalyLabel::Anomalous => -1,
            AnomalyLabel::Normal => 1,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            -1 => Some(AnomalyLabel::Anomalous),
            1 => Some(AnomalyLabel::Normal),
            _ => None,
        }
    }

    pub fn is_anomalous(self) -> bool {
        self == AnomalyLabel::Anomalous
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// One scorer's verdict for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyScore {
    pub name: String,
    pub score: f64,
    pub label: AnomalyLabel,
}
