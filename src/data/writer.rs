use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::model::{AnomalyLabel, AnomalyScore, CurveMatrix, LightCurve};
use crate::analysis::reconcile::ComparisonRow;

// ---------------------------------------------------------------------------
// Row schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ReconstructionRecord {
    #[serde(rename = "Star")]
    star: String,
    #[serde(rename = "ErrorReconstruccion")]
    error: f64,
    #[serde(rename = "Anomalia")]
    label: i8,
}

#[derive(Debug, Serialize)]
struct ComparisonRecord<'a> {
    #[serde(rename = "Star")]
    star: &'a str,
    #[serde(rename = "Anom_Autoencoder")]
    autoencoder: i8,
    #[serde(rename = "Anom_IsolationForest")]
    isolation_forest: i8,
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn writer_for(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    create_parent(path)?;
    csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))
}

/// Writer for serde records whose header row is written up front, so a file
/// with no rows still carries its columns.
fn record_writer_for(path: &Path, header: &[&str]) -> Result<csv::Writer<std::fs::File>> {
    create_parent(path)?;
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    w.write_record(header)?;
    Ok(w)
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn parse_label(value: i8, path: &Path) -> Result<AnomalyLabel> {
    AnomalyLabel::from_i8(value)
        .with_context(|| format!("{}: label {value} is not -1 or 1", path.display()))
}

// ---------------------------------------------------------------------------
// Processed curves
// ---------------------------------------------------------------------------

/// Write a curve as `tiempo,brillo`.
pub fn write_processed_curve(path: &Path, curve: &LightCurve) -> Result<()> {
    let mut w = writer_for(path)?;
    w.write_record(["tiempo", "brillo"])?;
    for (t, b) in curve.time.iter().zip(&curve.brightness) {
        w.write_record([fmt_f64(*t), fmt_f64(*b)])?;
    }
    w.flush()?;
    log::info!("Saved {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Principal components
// ---------------------------------------------------------------------------

fn pc_headers(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("PC{i}")).collect()
}

/// Write projected rows as `PC1..PCk`, without identity.
pub fn write_projection(path: &Path, projected: &CurveMatrix) -> Result<()> {
    let mut w = writer_for(path)?;
    w.write_record(pc_headers(projected.ncols()))?;
    for row in projected.values.rows() {
        w.write_record(row.iter().map(|v| fmt_f64(*v)))?;
    }
    w.flush()?;
    log::info!("Saved principal components to {}", path.display());
    Ok(())
}

/// Read the `PC*` columns of a projection file in file order.
pub fn read_projection(path: &Path) -> Result<Array2<f64>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let pc_cols: Vec<usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("PC"))
        .map(|(i, _)| i)
        .collect();
    if pc_cols.is_empty() {
        bail!("{}: no PC columns", path.display());
    }

    let mut flat = Vec::new();
    let mut n_rows = 0;
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for &c in &pc_cols {
            let cell = record.get(c).unwrap_or("");
            let v: f64 = cell
                .trim()
                .parse()
                .with_context(|| format!("row {row_no}: '{cell}' is not a number"))?;
            flat.push(v);
        }
        n_rows += 1;
    }
    Ok(Array2::from_shape_vec((n_rows, pc_cols.len()), flat)?)
}

// ---------------------------------------------------------------------------
// Scorer outputs
// ---------------------------------------------------------------------------

/// Write reconstruction-error verdicts: `Star,ErrorReconstruccion,Anomalia`.
pub fn write_reconstruction_scores(path: &Path, scores: &[AnomalyScore]) -> Result<()> {
    let mut w = record_writer_for(path, &["Star", "ErrorReconstruccion", "Anomalia"])?;
    for s in scores {
        w.serialize(ReconstructionRecord {
            star: s.name.clone(),
            error: s.score,
            label: s.label.as_i8(),
        })?;
    }
    w.flush()?;
    log::info!("Saved autoencoder results to {}", path.display());
    Ok(())
}

pub fn read_reconstruction_scores(path: &Path) -> Result<Vec<AnomalyScore>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize::<ReconstructionRecord>()
        .map(|r| -> Result<AnomalyScore> {
            let r = r.with_context(|| format!("parsing {}", path.display()))?;
            Ok(AnomalyScore {
                label: parse_label(r.label, path)?,
                name: r.star,
                score: r.error,
            })
        })
        .collect()
}

/// Write isolation verdicts next to the projected coordinates:
/// `PC1..PCk,Star,Anomaly,Score`. Rows of `projected` and `scores` must be
/// the same entities in the same order.
pub fn write_isolation_scores(
    path: &Path,
    projected: &CurveMatrix,
    scores: &[AnomalyScore],
) -> Result<()> {
    if projected.nrows() != scores.len() {
        bail!(
            "{} projected rows but {} scores",
            projected.nrows(),
            scores.len()
        );
    }
    let mut w = writer_for(path)?;
    let mut headers = pc_headers(projected.ncols());
    headers.extend(["Star", "Anomaly", "Score"].map(String::from));
    w.write_record(&headers)?;
    for (row, s) in projected.values.rows().into_iter().zip(scores) {
        let mut record: Vec<String> = row.iter().map(|v| fmt_f64(*v)).collect();
        record.push(s.name.clone());
        record.push(s.label.to_string());
        record.push(fmt_f64(s.score));
        w.write_record(&record)?;
    }
    w.flush()?;
    log::info!("Saved isolation forest results to {}", path.display());
    Ok(())
}

pub fn read_isolation_scores(path: &Path) -> Result<Vec<AnomalyScore>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("{} missing '{name}' column", path.display()))
    };
    let (star, anomaly, score) = (col("Star")?, col("Anomaly")?, col("Score")?);

    let mut out = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let label: i8 = record
            .get(anomaly)
            .unwrap_or("")
            .trim()
            .parse()
            .with_context(|| format!("row {row_no}: bad Anomaly"))?;
        out.push(AnomalyScore {
            name: record.get(star).unwrap_or("").to_string(),
            score: record
                .get(score)
                .unwrap_or("")
                .trim()
                .parse()
                .with_context(|| format!("row {row_no}: bad Score"))?,
            label: parse_label(label, path)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

pub fn write_comparison(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut w = record_writer_for(path, &["Star", "Anom_Autoencoder", "Anom_IsolationForest"])?;
    for r in rows {
        w.serialize(ComparisonRecord {
            star: &r.name,
            autoencoder: r.reconstruction.as_i8(),
            isolation_forest: r.isolation.as_i8(),
        })?;
    }
    w.flush()?;
    log::info!("Saved comparison to {}", path.display());
    Ok(())
}

/// Write any serializable summary as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    create_parent(path)?;
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
