use std::path::Path;

use lightcurve_anomaly::analysis::standardize::Standardizer;
use lightcurve_anomaly::config::PipelineConfig;
use lightcurve_anomaly::data::catalog::Split;
use lightcurve_anomaly::data::filter::OutlierFilter;
use lightcurve_anomaly::data::model::{AnomalyLabel, AnomalyScore, CurveMatrix, LightCurve};
use lightcurve_anomaly::data::resample::CurveResampler;
use lightcurve_anomaly::data::writer;
use lightcurve_anomaly::error::CurveError;
use lightcurve_anomaly::pipeline;
use lightcurve_anomaly::workspace::Workspace;

const TRAIN: [&str; 5] = ["T1", "T2", "T3", "T4", "T5"];
const TEST: [&str; 5] = ["S1", "S2", "S3", "S4", "S5"];

fn jittered(name: &str, n: usize, level: f64) -> LightCurve {
    let brightness = (0..n)
        .map(|i| level + if i % 2 == 0 { 0.001 } else { -0.001 })
        .collect();
    LightCurve::new(name, (0..n).map(|i| i as f64).collect(), brightness)
}

/// Raw export with `cadenceno`, `quality` and `pdcsap_flux`. Every 17th
/// cadence is flagged and every 23rd flux value is missing.
fn write_raw(dir: &Path, name: &str, k: usize, n: usize, dip: bool) {
    let mut text = String::from("cadenceno,quality,pdcsap_flux\n");
    for i in 0..n {
        let quality = if i % 17 == 16 { 4 } else { 0 };
        let wobble = ((i * 7919 + k * 31) % 13) as f64 * 0.4;
        let mut flux = 1000.0 * (1.0 + 0.01 * (i as f64 * 0.2 + k as f64).sin()) + wobble;
        if dip && (40..60).contains(&i) {
            flux *= 0.8;
        }
        let cell = if i % 23 == 5 {
            String::new()
        } else {
            flux.to_string()
        };
        text.push_str(&format!("{},{quality},{cell}\n", 5000 + i));
    }
    std::fs::write(dir.join(format!("{name}.csv")), text).unwrap();
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.split.train = TRAIN.map(String::from).to_vec();
    config.split.test = TEST.map(String::from).to_vec();
    config.resample.points = 50;
    config.autoencoder.params.hidden = 16;
    config.autoencoder.params.bottleneck = 4;
    config.autoencoder.params.epochs = 5;
    config.isolation.n_estimators = 50;
    config
}

fn seeded_workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path());
    ws.ensure_data_dirs().unwrap();
    let raw = ws.raw_dir();
    for (k, name) in TRAIN.iter().enumerate() {
        write_raw(&raw, name, k, 120, false);
    }
    for (k, name) in TEST.iter().enumerate() {
        write_raw(&raw, name, k + 10, 120, *name == "S3");
    }
    // on neither list
    write_raw(&raw, "Stray", 99, 120, false);
    (dir, ws)
}

#[test]
fn spike_removed_then_standardized_columns() {
    let filter = OutlierFilter::default();
    let resampler = CurveResampler::new(300);

    let mut vectors = Vec::new();
    for (i, level) in [1.0, 1.1, 1.2, 1.3].into_iter().enumerate() {
        let mut curve = jittered(&format!("C{i}"), 50, level);
        if i == 2 {
            curve.brightness[25] = level + 0.01;
        }
        let filtered = filter.apply(&curve);
        if i == 2 {
            assert_eq!(filtered.removed, vec![25]);
        } else {
            assert_eq!(filtered.removed_count(), 0);
        }
        vectors.push(resampler.resample(&filtered.curve).unwrap());
    }

    let matrix = CurveMatrix::from_vectors(vectors).unwrap();
    assert_eq!(matrix.values.dim(), (4, 300));

    let standardized = Standardizer::fit(&matrix).unwrap().apply(&matrix).unwrap();
    for col in standardized.values.columns() {
        let mean = col.mean().unwrap();
        let var = col.mapv(|v| (v - mean).powi(2)).mean().unwrap();
        assert!(mean.abs() < 1e-6, "mean {mean}");
        assert!((var - 1.0).abs() < 1e-6, "var {var}");
    }
}

#[test]
fn full_run_produces_joined_comparison() {
    let (_dir, ws) = seeded_workspace();
    let config = small_config();

    let summary = pipeline::process_raw(&config, &ws).unwrap();
    assert_eq!(summary.train, 5);
    assert_eq!(summary.test, 5);
    assert_eq!(summary.unassigned, vec!["Stray"]);
    assert!(summary.failed.is_empty());
    assert!(summary.duplicates.is_empty());
    assert!(ws.processed_dir(Split::Test).join("curva_luz_S3.csv").exists());

    let [train_pca, test_pca] = pipeline::run_pca(&config, &ws).unwrap();
    assert_eq!(train_pca.entities, TRAIN.to_vec());
    assert_eq!(test_pca.entities, TEST.to_vec());
    assert_eq!(test_pca.explained_variance_ratio.len(), 2);
    assert!(!test_pca.shared_basis);

    let reconstruction = pipeline::run_autoencoder(&config, &ws).unwrap();
    let names: Vec<&str> = reconstruction.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, TEST.to_vec());
    // 90th percentile of five distinct errors leaves only the largest above it
    let flagged = reconstruction
        .iter()
        .filter(|s| s.label == AnomalyLabel::Anomalous)
        .count();
    assert_eq!(flagged, 1);

    let isolation = pipeline::run_isolation_forest(&config, &ws).unwrap();
    assert_eq!(isolation.len(), 5);
    let iso_text = std::fs::read_to_string(ws.isolation_results()).unwrap();
    assert!(iso_text.starts_with("PC1,PC2,Star,Anomaly,Score\n"));

    let result = pipeline::run_comparison(&ws).unwrap();
    assert_eq!(result.rows.len(), 5);
    assert!(result.unmatched.is_empty());
    for row in &result.rows {
        let ae = reconstruction.iter().find(|s| s.name == row.name).unwrap();
        let iso = isolation.iter().find(|s| s.name == row.name).unwrap();
        assert_eq!(row.reconstruction, ae.label);
        assert_eq!(row.isolation, iso.label);
    }

    let text = std::fs::read_to_string(ws.comparison_results()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Star,Anom_Autoencoder,Anom_IsolationForest")
    );
    assert_eq!(lines.count(), 5);
}

#[test]
fn run_all_with_shared_basis() {
    let (_dir, ws) = seeded_workspace();
    let mut config = small_config();
    config.pca.shared_basis = true;

    let result = pipeline::run_all(&config, &ws).unwrap();
    assert_eq!(result.rows.len(), 5);

    let projected = pipeline::read_identified_projection(&ws, Split::Test).unwrap();
    assert_eq!(projected.names, TEST.to_vec());
    assert_eq!(projected.ncols(), 2);
}

#[test]
fn projection_without_summary_uses_sorted_names() {
    let (_dir, ws) = seeded_workspace();
    let config = small_config();
    pipeline::process_raw(&config, &ws).unwrap();
    pipeline::run_pca(&config, &ws).unwrap();

    std::fs::remove_file(ws.pca_summary(Split::Train)).unwrap();
    let projected = pipeline::read_identified_projection(&ws, Split::Train).unwrap();
    assert_eq!(projected.names, TRAIN.to_vec());
}

#[test]
fn count_mismatch_writes_no_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path());

    let score = |name: &str, label| AnomalyScore {
        name: name.to_string(),
        score: 0.1,
        label,
    };
    writer::write_reconstruction_scores(
        &ws.autoencoder_results(),
        &[
            score("A", AnomalyLabel::Normal),
            score("B", AnomalyLabel::Anomalous),
            score("C", AnomalyLabel::Normal),
        ],
    )
    .unwrap();
    let projected = CurveMatrix::with_names(
        vec!["A".into(), "B".into()],
        ndarray::array![[0.0, 1.0], [1.0, 0.0]],
    )
    .unwrap();
    writer::write_isolation_scores(
        &ws.isolation_results(),
        &projected,
        &[
            score("A", AnomalyLabel::Normal),
            score("B", AnomalyLabel::Normal),
        ],
    )
    .unwrap();

    let err = pipeline::run_comparison(&ws).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CurveError>(),
        Some(CurveError::CountMismatch { left: 3, right: 2 })
    ));
    assert!(!ws.comparison_results().exists());
}

#[test]
fn unreadable_raw_curve_is_skipped() {
    let (_dir, ws) = seeded_workspace();
    let config = small_config();
    // a single usable row is not a curve
    std::fs::write(
        ws.raw_dir().join("T5.csv"),
        "cadenceno,quality,pdcsap_flux\n1,0,100.0\n2,1,101.0\n",
    )
    .unwrap();

    let summary = pipeline::process_raw(&config, &ws).unwrap();
    assert_eq!(summary.failed, vec!["T5"]);
    assert_eq!(summary.train, 4);
    assert!(!ws.processed_dir(Split::Train).join("curva_luz_T5.csv").exists());
}

#[test]
fn second_file_for_same_star_is_skipped() {
    let (_dir, ws) = seeded_workspace();
    let config = small_config();
    // `curva_luz_T2.csv` also names T2 and sorts after `T2.csv`
    std::fs::write(
        ws.raw_dir().join("curva_luz_T2.csv"),
        "cadenceno,quality,pdcsap_flux\n1,0,1.0\n2,0,1.0\n3,0,1.0\n",
    )
    .unwrap();

    let summary = pipeline::process_raw(&config, &ws).unwrap();
    assert_eq!(summary.train, 5);
    assert_eq!(summary.duplicates, vec!["T2"]);

    let kept = std::fs::read_to_string(ws.processed_dir(Split::Train).join("curva_luz_T2.csv"))
        .unwrap();
    // the 120-cadence export, not the 3-row duplicate
    assert!(kept.lines().count() > 100);
}
