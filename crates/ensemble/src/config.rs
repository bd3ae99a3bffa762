//! Ensemble configuration parsing and validation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use swe_simulator::SimulationConfig;

use crate::error::{EnsembleError, Result};

/// Scheme every member runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    /// Forward-backward linear
    Fbl,
    /// Leapfrog
    Ctcs,
}

/// Gaussian surface bump used as the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialBump {
    /// Peak elevation of the central member (m)
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    /// Standard deviation in cells
    #[serde(default = "default_width")]
    pub width: f32,
    /// Relative amplitude spread across members, in `[0, 1)`
    #[serde(default)]
    pub spread: f32,
}

/// Top-level ensemble configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Ensemble name, used in logs
    pub name: String,
    /// Scheme of every member
    pub scheme: SchemeKind,
    /// Constant mean depth (m)
    pub mean_depth: f32,
    /// Number of members
    pub members: usize,
    /// Simulation end time (s)
    pub t_end: f32,
    /// Checkpoint interval (s); `None` writes only at the end
    #[serde(default)]
    pub output_interval: Option<f32>,
    /// Initial condition
    #[serde(default)]
    pub initial_bump: InitialBump,
    /// Per-member simulator configuration
    pub simulation: SimulationConfig,
}

// Default values
fn default_amplitude() -> f32 {
    1.0
}

fn default_width() -> f32 {
    4.0
}

impl Default for InitialBump {
    fn default() -> Self {
        Self {
            amplitude: default_amplitude(),
            width: default_width(),
            spread: 0.0,
        }
    }
}

impl SchemeKind {
    /// Registry name of the scheme.
    pub fn name(&self) -> &'static str {
        match self {
            SchemeKind::Fbl => "fbl",
            SchemeKind::Ctcs => "ctcs",
        }
    }
}

impl EnsembleConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: EnsembleConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded ensemble config `{}` from {}", config.name, path.display());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.members == 0 {
            return Err(EnsembleError::Config(
                "ensemble needs at least one member".into(),
            ));
        }
        if !(self.mean_depth.is_finite() && self.mean_depth > 0.0) {
            return Err(EnsembleError::Config(format!(
                "mean_depth must be positive, got {}",
                self.mean_depth
            )));
        }
        if !(self.t_end.is_finite() && self.t_end >= self.simulation.t0) {
            return Err(EnsembleError::Config(format!(
                "t_end = {} must not precede t0 = {}",
                self.t_end, self.simulation.t0
            )));
        }
        if let Some(interval) = self.output_interval {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(EnsembleError::Config(
                    "output_interval must be positive".into(),
                ));
            }
        }
        let width = self.initial_bump.width;
        if !(width.is_finite() && width > 0.0) {
            return Err(EnsembleError::Config("initial bump width must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.initial_bump.spread) {
            return Err(EnsembleError::Config(format!(
                "initial bump spread must lie in [0, 1), got {}",
                self.initial_bump.spread
            )));
        }
        self.simulation.validate()?;
        Ok(())
    }

    /// Checkpoint file of member `index`: `<stem>_member<index>.<ext>`.
    pub fn member_checkpoint_path(&self, index: usize) -> Option<PathBuf> {
        let path = self.simulation.output.checkpoint_path.as_ref()?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        let name = match path.extension() {
            Some(ext) => format!("{}_member{}.{}", stem, index, ext.to_string_lossy()),
            None => format!("{}_member{}", stem, index),
        };
        Some(path.with_file_name(name))
    }

    /// Simulator configuration of member `index`.
    pub fn member_config(&self, index: usize) -> SimulationConfig {
        let mut config = self.simulation.clone();
        if config.output.write_checkpoints {
            config.output.checkpoint_path = self.member_checkpoint_path(index);
        }
        config
    }
}
