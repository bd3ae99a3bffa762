//! Simulator configuration parsing and validation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SimulatorError};

/// Parameters shared by every scheme. Immutable once a simulator is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Interior cells in x
    pub nx: usize,
    /// Interior cells in y
    pub ny: usize,
    /// Ghost-cell margins on each side
    #[serde(default)]
    pub ghost_cells: GhostCells,
    /// Cell spacing in x (m)
    pub dx: f32,
    /// Cell spacing in y (m)
    pub dy: f32,
    /// Timestep (s). `None` lets the scheme pick one.
    #[serde(default)]
    pub dt: Option<f32>,
    /// Gravitational acceleration (m/s^2)
    #[serde(default = "default_gravity")]
    pub g: f32,
    /// Coriolis parameter at the reference row (1/s)
    #[serde(default)]
    pub f: f32,
    /// Linear bottom friction coefficient (m/s)
    #[serde(default)]
    pub r: f32,
    /// Eddy viscosity coefficient A (m^2/s)
    #[serde(default)]
    pub eddy_viscosity: Option<f32>,
    /// Initial simulation time (s)
    #[serde(default)]
    pub t0: f32,
    /// Slope limiter parameter for high-resolution schemes
    #[serde(default)]
    pub theta: Option<f32>,
    /// Runge-Kutta order for multi-stage schemes
    #[serde(default)]
    pub rk_order: Option<u32>,
    /// Beta-plane gradient of the Coriolis parameter (1/(m s))
    #[serde(default)]
    pub coriolis_beta: f32,
    /// Row (in interior cells) where the Coriolis parameter equals `f`
    #[serde(default)]
    pub y_zero_reference_cell: f32,
    /// Surface wind forcing
    #[serde(default)]
    pub wind_stress: WindStress,
    /// Offset of this domain inside a larger tiled domain (cells)
    #[serde(default)]
    pub offset: TileOffset,
    /// Work-group shape used for kernel launches
    #[serde(default)]
    pub tile: TileShape,
    /// Checkpoint output options
    #[serde(default)]
    pub output: OutputOptions,
}

/// Ghost-cell margins in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostCells {
    /// Cells added on the west and east sides
    pub x: usize,
    /// Cells added on the south and north sides
    pub y: usize,
}

/// Work-group (tile) shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileShape {
    /// Tile width in cells
    pub width: u32,
    /// Tile height in cells
    pub height: u32,
}

/// Position of this domain inside a multi-tile setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOffset {
    /// Offset in x (cells)
    pub x: i32,
    /// Offset in y (cells)
    pub y: i32,
}

/// Surface wind stress descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindStress {
    /// No wind forcing
    #[default]
    None,
    /// Spatially and temporally constant stress (N/m^2)
    Uniform {
        /// Stress in x
        tau_x: f32,
        /// Stress in y
        tau_y: f32,
    },
}

/// Checkpoint output options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Open a checkpoint writer at construction
    #[serde(default)]
    pub write_checkpoints: bool,
    /// Strip ghost cells from written frames
    #[serde(default = "default_ignore_ghost_cells")]
    pub ignore_ghost_cells: bool,
    /// Checkpoint file path, required when `write_checkpoints` is set
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
}

// Default values
fn default_gravity() -> f32 {
    9.81
}

fn default_ignore_ghost_cells() -> bool {
    true
}

impl Default for GhostCells {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

impl Default for TileShape {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
        }
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            write_checkpoints: false,
            ignore_ghost_cells: default_ignore_ghost_cells(),
            checkpoint_path: None,
        }
    }
}

impl WindStress {
    /// Stress components `(tau_x, tau_y)`; zero when there is no wind.
    pub fn components(&self) -> (f32, f32) {
        match *self {
            WindStress::None => (0.0, 0.0),
            WindStress::Uniform { tau_x, tau_y } => (tau_x, tau_y),
        }
    }
}

impl SimulationConfig {
    /// Minimal configuration for an `nx` x `ny` grid with default physics.
    pub fn new(nx: usize, ny: usize, dx: f32, dy: f32) -> Self {
        Self {
            nx,
            ny,
            ghost_cells: GhostCells::default(),
            dx,
            dy,
            dt: None,
            g: default_gravity(),
            f: 0.0,
            r: 0.0,
            eddy_viscosity: None,
            t0: 0.0,
            theta: None,
            rk_order: None,
            coriolis_beta: 0.0,
            y_zero_reference_cell: 0.0,
            wind_stress: WindStress::None,
            offset: TileOffset::default(),
            tile: TileShape::default(),
            output: OutputOptions::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(SimulatorError::configuration(format!(
                "grid dimensions must be positive, got nx = {}, ny = {}",
                self.nx, self.ny
            )));
        }
        if self.tile.width == 0 || self.tile.height == 0 {
            return Err(SimulatorError::configuration(format!(
                "tile dimensions must be positive, got {}x{}",
                self.tile.width, self.tile.height
            )));
        }
        if !(self.dx.is_finite() && self.dx > 0.0) || !(self.dy.is_finite() && self.dy > 0.0) {
            return Err(SimulatorError::configuration(
                "cell spacing dx and dy must be positive",
            ));
        }
        if let Some(dt) = self.dt {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(SimulatorError::configuration("dt must be positive when set"));
            }
        }
        if self.g < 0.0 {
            return Err(SimulatorError::configuration("gravity must be non-negative"));
        }
        if self.r < 0.0 {
            return Err(SimulatorError::configuration(
                "friction coefficient must be non-negative",
            ));
        }
        if let Some(a) = self.eddy_viscosity {
            if a < 0.0 {
                return Err(SimulatorError::configuration(
                    "eddy viscosity must be non-negative",
                ));
            }
        }
        if let Some(theta) = self.theta {
            if !(theta.is_finite() && theta > 0.0) {
                return Err(SimulatorError::configuration("theta must be positive"));
            }
        }
        if let Some(order) = self.rk_order {
            if !(1..=3).contains(&order) {
                return Err(SimulatorError::configuration(format!(
                    "rk_order must be 1, 2 or 3, got {}",
                    order
                )));
            }
        }
        if self.output.write_checkpoints && self.output.checkpoint_path.is_none() {
            return Err(SimulatorError::configuration(
                "write_checkpoints requires a checkpoint_path",
            ));
        }
        Ok(())
    }

    /// Padded field shape `(ny + 2 * ghost_y, nx + 2 * ghost_x)`.
    pub fn padded_shape(&self) -> (usize, usize) {
        (
            self.ny + 2 * self.ghost_cells.y,
            self.nx + 2 * self.ghost_cells.x,
        )
    }

    /// Interior domain shape `(ny, nx)`.
    pub fn domain_shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }
}
