//! Writes synthetic Kepler-style exports into `<root>/data/raw` so the
//! pipeline can be run end to end without downloading real observations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, ValueEnum};
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lightcurve_anomaly::workspace::Workspace;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Csv,
    Parquet,
}

/// Generate synthetic raw light curves
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Project root; files land in <root>/data/raw
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Cadences per curve
    #[arg(short, long, default_value_t = 2000)]
    length: usize,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

/// Periodic box-shaped dips: (period, duration, depth) in cadences and
/// relative flux.
type Transit = (usize, usize, f64);

struct StarModel {
    name: &'static str,
    baseline: f64,
    noise: f64,
    transits: Vec<Transit>,
    /// Irregular deep dimming events: (start, length, depth).
    dimming: Vec<(usize, usize, f64)>,
}

fn star_models() -> Vec<StarModel> {
    vec![
        StarModel {
            name: "Kepler-10",
            baseline: 42_000.0,
            noise: 0.0004,
            transits: vec![(84, 3, 0.0002)],
            dimming: vec![],
        },
        StarModel {
            name: "Kepler-22",
            baseline: 31_000.0,
            noise: 0.0005,
            transits: vec![(600, 12, 0.0005)],
            dimming: vec![],
        },
        StarModel {
            name: "Kepler-90",
            baseline: 18_500.0,
            noise: 0.0006,
            transits: vec![(300, 8, 0.0008), (470, 10, 0.0006)],
            dimming: vec![],
        },
        StarModel {
            name: "KIC_8462852",
            baseline: 12_000.0,
            noise: 0.0005,
            transits: vec![],
            dimming: vec![(700, 90, 0.15), (1500, 40, 0.08)],
        },
        StarModel {
            name: "Kepler-62",
            baseline: 9_800.0,
            noise: 0.0007,
            transits: vec![(250, 6, 0.0004)],
            dimming: vec![],
        },
        StarModel {
            name: "KIC_8197761",
            baseline: 15_200.0,
            noise: 0.0006,
            transits: vec![],
            dimming: vec![],
        },
        StarModel {
            name: "KIC_12557548",
            baseline: 7_400.0,
            noise: 0.0008,
            transits: vec![(16, 2, 0.005)],
            dimming: vec![(1200, 30, 0.012)],
        },
        StarModel {
            name: "KIC_3544595",
            baseline: 21_000.0,
            noise: 0.0005,
            transits: vec![(180, 5, 0.0003)],
            dimming: vec![],
        },
    ]
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-15);
    let u2: f64 = rng.random();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn relative_flux(model: &StarModel, i: usize) -> f64 {
    let mut flux = 1.0;
    for &(period, duration, depth) in &model.transits {
        if i % period < duration {
            flux -= depth;
        }
    }
    for &(start, len, depth) in &model.dimming {
        if (start..start + len).contains(&i) {
            // triangular profile, deepest mid-event
            let half = len as f64 / 2.0;
            let x = (i - start) as f64;
            flux -= depth * (1.0 - (x - half).abs() / half);
        }
    }
    flux
}

fn build_batch(model: &StarModel, length: usize, rng: &mut StdRng) -> Result<RecordBatch> {
    let first_cadence: i64 = rng.random_range(1_000..50_000);
    let mut cadence = Vec::with_capacity(length);
    let mut quality = Vec::with_capacity(length);
    let mut flux = Vec::with_capacity(length);

    for i in 0..length {
        cadence.push(first_cadence + i as i64);
        // a few flagged cadences, which the loader drops
        quality.push(if rng.random::<f64>() < 0.01 { 128 } else { 0 });
        let value = model.baseline * gauss(rng, relative_flux(model, i), model.noise);
        // short data gaps
        flux.push(if rng.random::<f64>() < 0.005 { None } else { Some(value) });
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("cadenceno", DataType::Int64, false),
        Field::new("quality", DataType::Int32, false),
        Field::new("pdcsap_flux", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(cadence)),
        Arc::new(Int32Array::from(quality)),
        Arc::new(Float64Array::from(flux)),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let column = |i: usize| batch.column(i).as_any();
    let (Some(cadence), Some(quality), Some(flux)) = (
        column(0).downcast_ref::<Int64Array>(),
        column(1).downcast_ref::<Int32Array>(),
        column(2).downcast_ref::<Float64Array>(),
    ) else {
        anyhow::bail!("unexpected column types in generated batch");
    };

    let mut w =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    w.write_record(["cadenceno", "quality", "pdcsap_flux"])?;
    for i in 0..batch.num_rows() {
        let f = if flux.is_null(i) {
            String::new()
        } else {
            flux.value(i).to_string()
        };
        w.write_record([cadence.value(i).to_string(), quality.value(i).to_string(), f])?;
    }
    w.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let ws = Workspace::new(&args.root);
    ws.ensure_data_dirs()?;

    for model in &star_models() {
        let batch = build_batch(model, args.length, &mut rng)?;
        let path = match args.format {
            Format::Csv => {
                let p = ws.raw_dir().join(format!("{}.csv", model.name));
                write_csv(&p, &batch)?;
                p
            }
            Format::Parquet => {
                let p = ws.raw_dir().join(format!("{}.parquet", model.name));
                write_parquet(&p, &batch)?;
                p
            }
        };
        let preview = batch.slice(0, 3.min(batch.num_rows()));
        log::debug!("\n{}", pretty_format_batches(&[preview])?);
        log::info!("Wrote {} cadences to {}", batch.num_rows(), path.display());
    }
    Ok(())
}
