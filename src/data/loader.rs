use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::LightCurve;
use crate::error::CurveError;

/// Time sources in preference order.
const TIME_COLUMNS: [&str; 3] = ["timecorr", "cadenceno", "time"];

// ---------------------------------------------------------------------------
// RawTable – numeric columns of one observation file
// ---------------------------------------------------------------------------

/// Column-oriented numeric table. Cells that are empty or not numbers are
/// `None`, mirroring a NaN in the source export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
    pub n_rows: usize,
}

impl RawTable {
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Keep only the rows for which `keep` is true, in every column.
    fn retain_rows(&mut self, keep: &[bool]) {
        for col in self.columns.values_mut() {
            let mut i = 0;
            col.retain(|_| {
                let k = keep[i];
                i += 1;
                k
            });
        }
        self.n_rows = keep.iter().filter(|&&k| k).count();
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a tabular file into a [`RawTable`]. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one observation per line
/// * `.parquet` – flat numeric columns (nulls allowed)
pub fn read_table(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => read_csv(path),
        "parquet" | "pq" => read_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load one raw observation file as a canonical light curve.
pub fn load_lightcurve(path: &Path, name: &str) -> Result<LightCurve> {
    let table = read_table(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(curve_from_table(table, name, path)?)
}

/// Build a [`LightCurve`] from a raw table.
///
/// Rows with a non-zero `quality` flag are dropped first. Time comes from
/// `timecorr`, else `cadenceno` (rebased to start at 0), else `time`.
/// Brightness comes from `flux`, else `pdcsap_flux` divided by its median.
/// Brightness gaps are filled by linear interpolation over row order, then by
/// the column median.
pub fn curve_from_table(
    mut table: RawTable,
    name: &str,
    path: &Path,
) -> Result<LightCurve, CurveError> {
    if let Some(quality) = table.column("quality") {
        let keep: Vec<bool> = quality.iter().map(|q| *q == Some(0.0)).collect();
        table.retain_rows(&keep);
    }

    let time_col = TIME_COLUMNS
        .iter()
        .find(|c| table.has_column(c))
        .ok_or_else(|| CurveError::MissingColumn {
            column: "time",
            path: path.to_path_buf(),
        })?;
    let mut time: Vec<f64> = table.columns[*time_col]
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    if *time_col == "cadenceno" {
        let min = time
            .iter()
            .copied()
            .filter(|t| !t.is_nan())
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            time.iter_mut().for_each(|t| *t -= min);
        }
    }

    let mut brightness: Vec<Option<f64>> = if let Some(flux) = table.column("flux") {
        flux.to_vec()
    } else if let Some(pdcsap) = table.column("pdcsap_flux") {
        let scale = median(pdcsap).unwrap_or(f64::NAN);
        pdcsap.iter().map(|v| v.map(|f| f / scale)).collect()
    } else {
        return Err(CurveError::MissingColumn {
            column: "brightness",
            path: path.to_path_buf(),
        });
    };
    for v in brightness.iter_mut() {
        if v.is_some_and(|f| !f.is_finite()) {
            *v = None;
        }
    }

    if table.n_rows < 2 {
        return Err(CurveError::InsufficientPoints {
            found: table.n_rows,
        });
    }

    let brightness = fill_gaps(&brightness).ok_or_else(|| CurveError::MissingColumn {
        column: "brightness",
        path: path.to_path_buf(),
    })?;

    Ok(LightCurve::new(name, time, brightness))
}

/// Read a processed curve (`tiempo`, `brillo`) written by an earlier run.
///
/// Returns `Ok(None)` for files the collection loader should skip: no `brillo`
/// column, fewer than two rows, or no finite brightness at all. Missing cells
/// are filled the same way as raw gaps.
pub fn load_processed_curve(path: &Path, name: &str) -> Result<Option<LightCurve>> {
    let table = read_table(path).with_context(|| format!("reading {}", path.display()))?;
    let Some(brillo) = table.column("brillo") else {
        log::warn!("{name}: no 'brillo' column, skipping");
        return Ok(None);
    };
    if table.n_rows < 2 {
        log::warn!("{name}: only {} rows, skipping", table.n_rows);
        return Ok(None);
    }
    let brillo: Vec<Option<f64>> = brillo
        .iter()
        .map(|&v| v.filter(|f| f.is_finite()))
        .collect();
    let Some(brightness) = fill_gaps(&brillo) else {
        log::warn!("{name}: no finite 'brillo' values, skipping");
        return Ok(None);
    };
    let time = match table.column("tiempo") {
        Some(t) => t.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        None => (0..table.n_rows).map(|i| i as f64).collect(),
    };
    Ok(Some(LightCurve::new(name, time, brightness)))
}

// ---------------------------------------------------------------------------
// Gap filling
// ---------------------------------------------------------------------------

/// Median of the present values, `None` when there are none.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 1 {
        Some(present[mid])
    } else {
        Some((present[mid - 1] + present[mid]) * 0.5)
    }
}

/// Interpolate gaps, then fill what is left (leading gaps) with the median of
/// the present values. `None` when nothing is present.
fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let fill = median(values)?;
    Some(
        interpolate_gaps(values)
            .into_iter()
            .map(|v| v.unwrap_or(fill))
            .collect(),
    )
}

/// Linear interpolation over index order. Interior gaps are bridged, trailing
/// gaps repeat the last known value, leading gaps stay empty.
fn interpolate_gaps(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut prev: Option<usize> = None;
    let mut i = 0;
    while i < values.len() {
        if values[i].is_some() {
            prev = Some(i);
            i += 1;
            continue;
        }
        let next = (i..values.len()).find(|&j| values[j].is_some());
        match (prev, next) {
            (Some(p), Some(n)) => {
                let (a, b) = (values[p].unwrap_or_default(), values[n].unwrap_or_default());
                for (j, slot) in out.iter_mut().enumerate().take(n).skip(i) {
                    let frac = (j - p) as f64 / (n - p) as f64;
                    *slot = Some(a + (b - a) * frac);
                }
                i = n;
            }
            (Some(p), None) => {
                for slot in out.iter_mut().skip(i) {
                    *slot = values[p];
                }
                break;
            }
            (None, Some(n)) => i = n,
            (None, None) => break,
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut cols: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];
    let mut n_rows = 0;
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (idx, col) in cols.iter_mut().enumerate() {
            col.push(parse_cell(record.get(idx).unwrap_or("")));
        }
        n_rows += 1;
    }

    Ok(RawTable {
        columns: headers.into_iter().zip(cols).collect(),
        n_rows,
    })
}

fn parse_cell(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one observation per row. Numeric columns of any
/// width are widened to `f64`; non-numeric columns are ignored.
fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut table = RawTable::default();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        for (idx, field) in schema.fields().iter().enumerate() {
            let col = batch.column(idx);
            if !col.data_type().is_numeric() {
                continue;
            }
            let widened = cast(col, &DataType::Float64)
                .with_context(|| format!("casting column '{}'", field.name()))?;
            let values = widened
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array after cast")?;
            table
                .columns
                .entry(field.name().clone())
                .or_default()
                .extend(values.iter().map(|v| v.filter(|f| !f.is_nan())));
        }
        table.n_rows += batch.num_rows();
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn table(cols: &[(&str, Vec<Option<f64>>)]) -> RawTable {
        let n_rows = cols.first().map(|(_, c)| c.len()).unwrap_or(0);
        RawTable {
            columns: cols
                .iter()
                .map(|(n, c)| (n.to_string(), c.clone()))
                .collect(),
            n_rows,
        }
    }

    fn some(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().map(|&x| Some(x)).collect()
    }

    fn path() -> PathBuf {
        PathBuf::from("curva_luz_X.csv")
    }

    #[test]
    fn prefers_timecorr_and_flux() {
        let t = table(&[
            ("time", some(&[10.0, 11.0, 12.0])),
            ("timecorr", some(&[0.1, 0.2, 0.3])),
            ("flux", some(&[1.0, 2.0, 3.0])),
            ("pdcsap_flux", some(&[5.0, 5.0, 5.0])),
        ]);
        let c = curve_from_table(t, "X", &path()).unwrap();
        assert_eq!(c.time, vec![0.1, 0.2, 0.3]);
        assert_eq!(c.brightness, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn cadenceno_is_rebased_and_pdcsap_normalized() {
        let t = table(&[
            ("cadenceno", some(&[100.0, 101.0, 102.0, 103.0])),
            ("pdcsap_flux", some(&[200.0, 100.0, 100.0, 300.0])),
        ]);
        let c = curve_from_table(t, "X", &path()).unwrap();
        assert_eq!(c.time, vec![0.0, 1.0, 2.0, 3.0]);
        // median = 150
        assert!((c.brightness[1] - 100.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn quality_filter_runs_first() {
        let t = table(&[
            ("quality", some(&[0.0, 128.0, 0.0, 0.0])),
            ("time", some(&[0.0, 1.0, 2.0, 3.0])),
            ("flux", some(&[1.0, 99.0, 1.0, 1.0])),
        ]);
        let c = curve_from_table(t, "X", &path()).unwrap();
        assert_eq!(c.time, vec![0.0, 2.0, 3.0]);
        assert!(c.brightness.iter().all(|&b| b == 1.0));
    }

    #[test]
    fn gaps_interpolated_then_median_filled() {
        let t = table(&[
            ("time", some(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])),
            (
                "flux",
                vec![None, Some(2.0), None, Some(4.0), Some(6.0), None],
            ),
        ]);
        let c = curve_from_table(t, "X", &path()).unwrap();
        // leading gap -> median of original values (4.0), interior -> 3.0, trailing -> 6.0
        assert_eq!(c.brightness, vec![4.0, 2.0, 3.0, 4.0, 6.0, 6.0]);
    }

    #[test]
    fn missing_time_column() {
        let t = table(&[("flux", some(&[1.0, 2.0]))]);
        let err = curve_from_table(t, "X", &path()).unwrap_err();
        assert!(matches!(err, CurveError::MissingColumn { column: "time", .. }));
    }

    #[test]
    fn missing_brightness_column() {
        let t = table(&[("time", some(&[1.0, 2.0]))]);
        let err = curve_from_table(t, "X", &path()).unwrap_err();
        assert!(matches!(
            err,
            CurveError::MissingColumn {
                column: "brightness",
                ..
            }
        ));
    }

    #[test]
    fn single_row_is_insufficient() {
        let t = table(&[("time", some(&[1.0])), ("flux", some(&[1.0]))]);
        let err = curve_from_table(t, "X", &path()).unwrap_err();
        assert!(matches!(err, CurveError::InsufficientPoints { found: 1 }));
    }

    #[test]
    fn parquet_export_loads_like_csv() {
        use std::sync::Arc;

        use arrow::array::{ArrayRef, Int32Array, Int64Array, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let schema = Arc::new(Schema::new(vec![
            Field::new("cadenceno", DataType::Int64, false),
            Field::new("quality", DataType::Int32, false),
            Field::new("pdcsap_flux", DataType::Float64, true),
            Field::new("mission", DataType::Utf8, false),
        ]));
        let batch = |cadence: Vec<i64>, quality: Vec<i32>, flux: Vec<Option<f64>>| {
            let n = cadence.len();
            let columns: Vec<ArrayRef> = vec![
                Arc::new(Int64Array::from(cadence)),
                Arc::new(Int32Array::from(quality)),
                Arc::new(Float64Array::from(flux)),
                Arc::new(StringArray::from(vec!["Kepler"; n])),
            ];
            RecordBatch::try_new(schema.clone(), columns).unwrap()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Kepler-10.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), None).unwrap();
        writer
            .write(&batch(
                vec![10, 11, 12],
                vec![0, 0, 1],
                vec![Some(100.0), None, Some(300.0)],
            ))
            .unwrap();
        writer
            .write(&batch(vec![13, 14], vec![0, 0], vec![Some(200.0), Some(200.0)]))
            .unwrap();
        writer.close().unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.n_rows, 5);
        assert!(!table.has_column("mission"));
        assert_eq!(table.column("pdcsap_flux").unwrap()[1], None);

        let c = load_lightcurve(&path, "Kepler-10").unwrap();
        // quality drops cadence 12; median of the rest is 200
        assert_eq!(c.time, vec![0.0, 1.0, 3.0, 4.0]);
        assert_eq!(c.brightness, vec![0.5, 0.75, 1.0, 1.0]);
    }
}
