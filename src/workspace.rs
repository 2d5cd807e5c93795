use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::data::catalog::Split;

/// On-disk layout of one project: raw inputs, processed collections and one
/// results directory per stage. Every stage receives this explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("data").join("raw")
    }

    pub fn processed_dir(&self, split: Split) -> PathBuf {
        self.root.join("data").join("processed").join(split.as_str())
    }

    pub fn pca_dir(&self, split: Split) -> PathBuf {
        self.results_dir().join("pca").join(split.as_str())
    }

    pub fn pca_results(&self, split: Split) -> PathBuf {
        self.pca_dir(split).join("pca_results.csv")
    }

    pub fn pca_summary(&self, split: Split) -> PathBuf {
        self.pca_dir(split).join("pca_summary.json")
    }

    pub fn autoencoder_results(&self) -> PathBuf {
        self.results_dir()
            .join("autoencoder")
            .join("autoencoder_anomaly_results.csv")
    }

    pub fn isolation_results(&self) -> PathBuf {
        self.results_dir()
            .join("isolation_forest")
            .join("pca_isolation_forest_results.csv")
    }

    pub fn comparison_results(&self) -> PathBuf {
        self.results_dir()
            .join("comparison")
            .join("comparacion_modelos.csv")
    }

    fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    /// Create the input and collection directories if they do not exist.
    pub fn ensure_data_dirs(&self) -> Result<()> {
        for dir in [
            self.raw_dir(),
            self.processed_dir(Split::Train),
            self.processed_dir(Split::Test),
        ] {
            std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }
}
