/// Data layer: curve types, loading, cleaning, resampling and persistence.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  raw table → LightCurve (quality, time, brightness)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  rolling mean ± σ·std → FilteredCurve
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ resample  │  index axis → N points on [0, 1] → FixedVector
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ catalog   │  sorted collection → CurveMatrix
///   └──────────┘
/// ```
pub mod catalog;
pub mod filter;
pub mod loader;
pub mod model;
pub mod resample;
pub mod writer;
