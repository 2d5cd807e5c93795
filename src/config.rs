//! Pipeline configuration, read from an optional TOML file.
//!
//! Every field has a default, so a missing file, an empty file, or a file that
//! sets only a few keys are all valid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::analysis::autoencoder::AutoencoderParams;
use crate::analysis::isolation::IsolationParams;
use crate::data::catalog::{Split, SplitPlan};
use crate::data::filter::OutlierFilter;
use crate::data::resample::CurveResampler;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub split: SplitConfig,
    pub filter: FilterConfig,
    pub resample: ResampleConfig,
    pub pca: PcaConfig,
    pub autoencoder: AutoencoderConfig,
    pub isolation: IsolationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Project root holding `data/` and `results/`.
    pub root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train: Vec<String>,
    pub test: Vec<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            train: ["Kepler-10", "Kepler-22", "Kepler-90", "KIC_8462852"]
                .map(String::from)
                .to_vec(),
            test: ["Kepler-62", "KIC_8197761", "KIC_12557548", "KIC_3544595"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub window: usize,
    pub sigma: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            window: 10,
            sigma: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub points: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        ResampleConfig { points: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub components: usize,
    /// Reuse the training standardizer and basis for the test collection
    /// instead of fitting both independently.
    pub shared_basis: bool,
}

impl Default for PcaConfig {
    fn default() -> Self {
        PcaConfig {
            components: 2,
            shared_basis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderConfig {
    #[serde(flatten)]
    pub params: AutoencoderParams,
    /// Which collection the trained network scores.
    pub score_collection: Split,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        AutoencoderConfig {
            params: AutoencoderParams::default(),
            score_collection: Split::Test,
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.filter.window < 2 {
            bail!("filter.window must be at least 2, got {}", self.filter.window);
        }
        if self.resample.points < 2 {
            bail!("resample.points must be at least 2, got {}", self.resample.points);
        }
        if self.pca.components == 0 {
            bail!("pca.components must be positive");
        }
        let ae = &self.autoencoder.params;
        if !(0.0..=100.0).contains(&ae.percentile) {
            bail!("autoencoder.percentile must be in 0..=100, got {}", ae.percentile);
        }
        if !(0.0..1.0).contains(&ae.validation_split) {
            bail!(
                "autoencoder.validation_split must be in [0, 1), got {}",
                ae.validation_split
            );
        }
        if ae.hidden == 0 || ae.bottleneck == 0 {
            bail!("autoencoder layer widths must be positive");
        }
        Ok(())
    }

    pub fn outlier_filter(&self) -> OutlierFilter {
        OutlierFilter::new(self.filter.window, self.filter.sigma)
    }

    pub fn resampler(&self) -> CurveResampler {
        CurveResampler::new(self.resample.points)
    }

    pub fn split_plan(&self) -> SplitPlan {
        SplitPlan::new(self.split.train.clone(), self.split.test.clone())
    }
}
