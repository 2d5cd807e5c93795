//! Unsupervised anomaly detection over stellar light curves.
//!
//! Raw brightness time series are cleaned and resampled by [`data`], scored
//! by two independent methods in [`analysis`], and the verdicts are joined by
//! entity name. [`pipeline`] runs the stages against a [`workspace::Workspace`].

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod workspace;
