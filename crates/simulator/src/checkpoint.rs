//! Checkpoint writing and hotstart reading.
//!
//! The bundled format is JSON Lines: a [`CheckpointHeader`] on the first line,
//! then one [`CheckpointFrame`] per written timestep.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::{Result, SimulatorError};
use crate::state::{FieldTriple, StateSnapshot};

/// Sink for periodic state snapshots. Opened when checkpointing is enabled,
/// closed exactly once.
pub trait CheckpointWriter: Send {
    /// Append one timestep.
    fn write_timestep(&mut self, t: f32, state: &StateSnapshot) -> Result<()>;

    /// Flush and release the underlying resource.
    fn close(&mut self) -> Result<()>;
}

/// First line of a checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    /// Scheme name used for restoring
    pub scheme: String,
    /// Scheme-specific parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Configuration of the writing simulator
    pub config: SimulationConfig,
    /// Whether frames include ghost cells
    pub ghost_cells_included: bool,
}

/// One stored timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFrame {
    /// Simulation time
    pub t: f32,
    /// Rows
    pub ny: usize,
    /// Columns
    pub nx: usize,
    /// Surface elevation, row-major
    pub eta: Vec<f32>,
    /// Momentum in x, row-major
    pub hu: Vec<f32>,
    /// Momentum in y, row-major
    pub hv: Vec<f32>,
}

impl CheckpointFrame {
    /// Capture a snapshot at time `t`.
    pub fn from_snapshot(t: f32, state: &StateSnapshot) -> Self {
        let (ny, nx) = state.shape();
        let flatten = |field: &Array2<f32>| field.iter().copied().collect::<Vec<f32>>();
        Self {
            t,
            ny,
            nx,
            eta: flatten(&state.eta),
            hu: flatten(&state.hu),
            hv: flatten(&state.hv),
        }
    }

    /// Rebuild the host snapshot.
    pub fn to_snapshot(&self) -> Result<StateSnapshot> {
        let dims = (self.ny, self.nx);
        Ok(FieldTriple::new(
            Array2::from_shape_vec(dims, self.eta.clone())?,
            Array2::from_shape_vec(dims, self.hu.clone())?,
            Array2::from_shape_vec(dims, self.hv.clone())?,
        ))
    }
}

/// [`CheckpointWriter`] producing a JSON Lines file.
pub struct JsonCheckpointWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames: usize,
}

impl JsonCheckpointWriter {
    /// Create the file at `path` and write the header.
    pub fn create(path: impl AsRef<Path>, header: &CheckpointHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, header)?;
        writer.write_all(b"\n")?;
        tracing::info!(
            "Opened checkpoint {} for scheme {}",
            path.display(),
            header.scheme
        );
        Ok(Self {
            path,
            writer: Some(writer),
            frames: 0,
        })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl CheckpointWriter for JsonCheckpointWriter {
    fn write_timestep(&mut self, t: f32, state: &StateSnapshot) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            SimulatorError::Checkpoint(format!("{} is already closed", self.path.display()))
        })?;
        serde_json::to_writer(&mut *writer, &CheckpointFrame::from_snapshot(t, state))?;
        writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::info!(
                "Closed checkpoint {} after {} frames",
                self.path.display(),
                self.frames
            );
        }
        Ok(())
    }
}

impl Drop for JsonCheckpointWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close checkpoint {}: {}", self.path.display(), e);
        }
    }
}

/// Header and last frame of a checkpoint file.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// File header
    pub header: CheckpointHeader,
    /// Most recent frame
    pub last: CheckpointFrame,
    /// Number of frames in the file
    pub frames: usize,
}

impl Checkpoint {
    /// Read only the header line.
    pub fn read_header(path: impl AsRef<Path>) -> Result<CheckpointHeader> {
        let path = path.as_ref();
        let mut line = String::new();
        BufReader::new(File::open(path)?).read_line(&mut line)?;
        if line.trim().is_empty() {
            return Err(SimulatorError::Checkpoint(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(serde_json::from_str(&line)?)
    }

    /// Read a checkpoint file, keeping only the last frame.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header_line = lines.next().ok_or_else(|| {
            SimulatorError::Checkpoint(format!("{} is empty", path.display()))
        })??;
        let header: CheckpointHeader = serde_json::from_str(&header_line)?;

        let mut last = None;
        let mut frames = 0;
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            last = Some(serde_json::from_str::<CheckpointFrame>(&line)?);
            frames += 1;
        }
        let last = last.ok_or_else(|| {
            SimulatorError::Checkpoint(format!("{} contains no timesteps", path.display()))
        })?;

        Ok(Self {
            header,
            last,
            frames,
        })
    }
}

/// Path used when a hotstarted run keeps writing: `<stem>_continued.<ext>`.
pub fn continuation_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_continued.{}", stem, ext.to_string_lossy()),
        None => format!("{}_continued", stem),
    };
    path.with_file_name(name)
}
