//! Stage drivers. Each stage reads what the previous one persisted under the
//! [`Workspace`] and writes its own results directory, so stages can run
//! one at a time or back to back through [`run_all`].

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::autoencoder::Autoencoder;
use crate::analysis::isolation::IsolationForest;
use crate::analysis::pca::Projection;
use crate::analysis::reconcile::{Reconciliation, reconcile};
use crate::analysis::score_and_report;
use crate::analysis::standardize::Standardizer;
use crate::config::PipelineConfig;
use crate::data::catalog::{
    Split, attach_sorted_identities, list_entities, load_collection, processed_file_name,
};
use crate::data::loader::load_lightcurve;
use crate::data::model::{AnomalyScore, CurveMatrix};
use crate::data::writer;
use crate::workspace::Workspace;

const RAW_EXTENSIONS: [&str; 3] = ["csv", "parquet", "pq"];

// ---------------------------------------------------------------------------
// Stage 1: raw curves → processed collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub train: usize,
    pub test: usize,
    /// Entities on neither allow-list.
    pub unassigned: Vec<String>,
    /// Entities whose raw file could not be turned into a curve.
    pub failed: Vec<String>,
    /// Extra raw files for an entity already processed in this batch.
    pub duplicates: Vec<String>,
}

/// Load, clean and file every raw curve into its train or test collection.
///
/// A curve that fails to load is logged and skipped; the batch continues.
pub fn process_raw(config: &PipelineConfig, ws: &Workspace) -> Result<ProcessSummary> {
    ws.ensure_data_dirs()?;
    let plan = config.split_plan();
    let filter = config.outlier_filter();
    let mut summary = ProcessSummary::default();
    let mut seen = HashSet::new();

    for (name, path) in list_entities(&ws.raw_dir(), &RAW_EXTENSIONS)? {
        if !seen.insert(name.clone()) {
            log::warn!("{name}: already read from another file, skipping {}", path.display());
            summary.duplicates.push(name);
            continue;
        }
        log::info!("Processing {name}");
        let Some(split) = plan.assign(&name) else {
            log::warn!("{name} is not on either list, skipping");
            summary.unassigned.push(name);
            continue;
        };
        let curve = match load_lightcurve(&path, &name) {
            Ok(curve) => curve,
            Err(e) => {
                log::error!("Failed to process {}: {e:#}", path.display());
                summary.failed.push(name);
                continue;
            }
        };
        let filtered = filter.apply(&curve);
        let out = ws.processed_dir(split).join(processed_file_name(&name));
        writer::write_processed_curve(&out, &filtered.curve)?;
        match split {
            Split::Train => summary.train += 1,
            Split::Test => summary.test += 1,
        }
    }

    log::info!(
        "Processed {} train and {} test curves ({} unassigned, {} failed, {} duplicate)",
        summary.train,
        summary.test,
        summary.unassigned.len(),
        summary.failed.len(),
        summary.duplicates.len()
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Stage 2: standardize + project
// ---------------------------------------------------------------------------

/// Persisted next to `pca_results.csv` so row identity survives the CSV,
/// which holds only the component columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaSummary {
    pub split: Split,
    pub entities: Vec<String>,
    pub explained_variance_ratio: Vec<f64>,
    pub shared_basis: bool,
}

fn project_and_save(
    ws: &Workspace,
    split: Split,
    matrix: &CurveMatrix,
    scaler: &Standardizer,
    projection: &Projection,
    shared_basis: bool,
) -> Result<PcaSummary> {
    let projected = projection.apply(&scaler.apply(matrix)?)?;
    writer::write_projection(&ws.pca_results(split), &projected)?;

    let ratios = projection.explained_variance_ratio.to_vec();
    let formatted: Vec<String> = ratios
        .iter()
        .enumerate()
        .map(|(i, r)| format!("PC{} {r:.2}", i + 1))
        .collect();
    log::info!(
        "{split}: {} components, explained variance {}",
        projection.n_components(),
        formatted.join(", ")
    );

    let summary = PcaSummary {
        split,
        entities: projected.names.clone(),
        explained_variance_ratio: ratios,
        shared_basis,
    };
    writer::write_json(&ws.pca_summary(split), &summary)?;
    Ok(summary)
}

/// Standardize and project both collections.
///
/// By default each collection gets its own standardizer and basis; with
/// `pca.shared_basis` the test collection reuses the training fit.
pub fn run_pca(config: &PipelineConfig, ws: &Workspace) -> Result<[PcaSummary; 2]> {
    let resampler = config.resampler();
    let k = config.pca.components;
    let shared = config.pca.shared_basis;

    let train = load_collection(&ws.processed_dir(Split::Train), &resampler)?;
    let train_scaler = Standardizer::fit(&train)?;
    let train_projection = Projection::fit(&train_scaler.apply(&train)?, k)?;
    let train_summary =
        project_and_save(ws, Split::Train, &train, &train_scaler, &train_projection, shared)?;

    let test = load_collection(&ws.processed_dir(Split::Test), &resampler)?;
    let test_summary = if shared {
        project_and_save(ws, Split::Test, &test, &train_scaler, &train_projection, shared)?
    } else {
        let scaler = Standardizer::fit(&test)?;
        let projection = Projection::fit(&scaler.apply(&test)?, k)?;
        project_and_save(ws, Split::Test, &test, &scaler, &projection, shared)?
    };

    Ok([train_summary, test_summary])
}

/// Read a projection back with its row identities: from the summary written
/// alongside it when present, otherwise from the sorted collection listing.
pub fn read_identified_projection(ws: &Workspace, split: Split) -> Result<CurveMatrix> {
    let values = writer::read_projection(&ws.pca_results(split))?;
    let summary_path = ws.pca_summary(split);
    if summary_path.exists() {
        let text = std::fs::read_to_string(&summary_path)
            .with_context(|| format!("reading {}", summary_path.display()))?;
        let summary: PcaSummary = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", summary_path.display()))?;
        return Ok(CurveMatrix::with_names(summary.entities, values)?);
    }

    log::warn!(
        "{} missing, pairing {split} rows with sorted file names",
        summary_path.display()
    );
    let names = list_entities(&ws.processed_dir(split), &["csv"])?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    Ok(attach_sorted_identities(names, values)?)
}

// ---------------------------------------------------------------------------
// Stage 3: reconstruction scorer
// ---------------------------------------------------------------------------

/// Train the autoencoder on the standardized training collection and score
/// the configured collection.
pub fn run_autoencoder(config: &PipelineConfig, ws: &Workspace) -> Result<Vec<AnomalyScore>> {
    let resampler = config.resampler();
    let train = load_collection(&ws.processed_dir(Split::Train), &resampler)?;
    let scaler = Standardizer::fit(&train)?;
    let train_std = scaler.apply(&train)?;

    let mut model = Autoencoder::new(train_std.ncols(), config.autoencoder.params.clone());
    let history = model.fit(&train_std)?;
    if let Some(val) = history.validation.last() {
        log::info!("Final validation loss {val:.6}");
    }

    let scored = match config.autoencoder.score_collection {
        Split::Train => train_std,
        Split::Test => {
            let test = load_collection(&ws.processed_dir(Split::Test), &resampler)?;
            if config.pca.shared_basis {
                scaler.apply(&test)?
            } else {
                Standardizer::fit(&test)?.apply(&test)?
            }
        }
    };

    let scores = score_and_report(&model, &scored)?;
    writer::write_reconstruction_scores(&ws.autoencoder_results(), &scores)?;
    Ok(scores)
}

// ---------------------------------------------------------------------------
// Stage 4: isolation scorer
// ---------------------------------------------------------------------------

/// Fit the isolation forest on the training projection and score the test
/// projection.
pub fn run_isolation_forest(config: &PipelineConfig, ws: &Workspace) -> Result<Vec<AnomalyScore>> {
    let train = read_identified_projection(ws, Split::Train)?;
    let test = read_identified_projection(ws, Split::Test)?;

    let forest = IsolationForest::fit(&train, &config.isolation)?;
    let scores = score_and_report(&forest, &test)?;
    writer::write_isolation_scores(&ws.isolation_results(), &test, &scores)?;
    Ok(scores)
}

// ---------------------------------------------------------------------------
// Stage 5: reconciliation
// ---------------------------------------------------------------------------

/// Join both scorers' verdicts by entity name and save the comparison.
/// Nothing is written when the two result sets differ in size.
pub fn run_comparison(ws: &Workspace) -> Result<Reconciliation> {
    let reconstruction = writer::read_reconstruction_scores(&ws.autoencoder_results())?;
    let isolation = writer::read_isolation_scores(&ws.isolation_results())?;

    let result = reconcile(&reconstruction, &isolation)
        .context("comparing autoencoder and isolation forest verdicts")?;

    log::info!("Star | Anom_Autoencoder | Anom_IsolationForest");
    for row in &result.rows {
        log::info!("{} | {} | {}", row.name, row.reconstruction, row.isolation);
    }
    log::info!(
        "Methods agree on {} of {} curves ({:.0}%)",
        result.agreement_count(),
        result.rows.len(),
        result.agreement_rate() * 100.0
    );

    writer::write_comparison(&ws.comparison_results(), &result.rows)?;
    Ok(result)
}

/// Every stage in order.
pub fn run_all(config: &PipelineConfig, ws: &Workspace) -> Result<Reconciliation> {
    process_raw(config, ws)?;
    run_pca(config, ws)?;
    run_autoencoder(config, ws)?;
    run_isolation_forest(config, ws)?;
    run_comparison(ws)
}
