//! Reference schemes for the linear shallow-water equations.
//!
//! Both schemes run on a collocated grid with periodic boundaries and a
//! constant mean depth. Stencils are evaluated on the host: each sub-step
//! downloads the current state, computes the next one, writes it into
//! generation 1 and swaps. After every step generation 0 holds the newest
//! state and generation 1 the state one sub-step earlier.
//!
//! - [`Fbl`] -- forward-backward linear.
//! - [`Ctcs`] -- centred-time centred-space leapfrog with optional eddy viscosity.

mod ctcs;
mod fbl;

pub use ctcs::Ctcs;
pub use fbl::Fbl;

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{continuation_path, Checkpoint};
use crate::config::{SimulationConfig, WindStress};
use crate::device::CommandQueue;
use crate::error::{Result, SimulatorError};
use crate::runtime::SimulatorCore;
use crate::state::{Generation, StateSnapshot};

/// Density of sea water (kg/m^3).
pub const RHO_WATER: f32 = 1025.0;

/// Parameters recorded in checkpoint headers by the reference schemes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct ReferenceParameters {
    pub mean_depth: f32,
}

/// Reject configurations the periodic stencils cannot run on.
pub(crate) fn check_reference_config(
    scheme: &str,
    config: &SimulationConfig,
    mean_depth: f32,
) -> Result<()> {
    config.validate()?;
    let ghost = config.ghost_cells;
    if ghost.x == 0 || ghost.y == 0 {
        return Err(SimulatorError::configuration(format!(
            "{} needs at least one ghost cell on each side, got {}x{}",
            scheme, ghost.x, ghost.y
        )));
    }
    if ghost.x > config.nx || ghost.y > config.ny {
        return Err(SimulatorError::configuration(format!(
            "{}: periodic ghost margins {}x{} exceed the {}x{} domain",
            scheme, ghost.x, ghost.y, config.nx, config.ny
        )));
    }
    if !(mean_depth.is_finite() && mean_depth > 0.0) {
        return Err(SimulatorError::configuration(format!(
            "{}: mean depth must be positive, got {}",
            scheme, mean_depth
        )));
    }
    Ok(())
}

/// Configured timestep, or `0.25 * min(dx, dy) / sqrt(g * H)`.
pub(crate) fn gravity_wave_dt(config: &SimulationConfig, mean_depth: f32) -> f32 {
    config
        .dt
        .unwrap_or_else(|| 0.25 * config.dx.min(config.dy) / (config.g * mean_depth).sqrt())
}

/// Copy the opposite interior edge into each ghost margin.
pub(crate) fn fill_periodic(field: &mut Array2<f32>, gx: usize, gy: usize) {
    let (rows, cols) = field.dim();
    let nx = cols - 2 * gx;
    let ny = rows - 2 * gy;

    for k in 0..gx {
        let east = field.column(nx + k).to_owned();
        field.column_mut(k).assign(&east);
        let west = field.column(gx + k).to_owned();
        field.column_mut(gx + nx + k).assign(&west);
    }
    // Rows after columns so the corners wrap in both directions
    for k in 0..gy {
        let north = field.row(ny + k).to_owned();
        field.row_mut(k).assign(&north);
        let south = field.row(gy + k).to_owned();
        field.row_mut(gy + ny + k).assign(&south);
    }
}

/// Grid spacing, physical constants and forcing seen by one sub-step.
pub(crate) struct Stencil {
    pub gx: usize,
    pub gy: usize,
    pub nx: usize,
    pub ny: usize,
    pub dx: f32,
    pub dy: f32,
    pub g: f32,
    pub h: f32,
    pub r: f32,
    pub eddy_viscosity: f32,
    f: f32,
    beta: f32,
    y_reference: f32,
    wind: (f32, f32),
}

impl Stencil {
    pub fn new(config: &SimulationConfig, wind: WindStress, mean_depth: f32) -> Self {
        Self {
            gx: config.ghost_cells.x,
            gy: config.ghost_cells.y,
            nx: config.nx,
            ny: config.ny,
            dx: config.dx,
            dy: config.dy,
            g: config.g,
            h: mean_depth,
            r: config.r,
            eddy_viscosity: config.eddy_viscosity.unwrap_or(0.0),
            f: config.f,
            beta: config.coriolis_beta,
            // Rows are counted in the global (tiled) domain
            y_reference: config.y_zero_reference_cell - config.offset.y as f32,
            wind: wind.components(),
        }
    }

    /// Interior `(j, i)` indices of the padded grid, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let (gx, gy, nx, ny) = (self.gx, self.gy, self.nx, self.ny);
        (gy..gy + ny).flat_map(move |j| (gx..gx + nx).map(move |i| (j, i)))
    }

    /// Coriolis parameter on padded row `j` (beta-plane).
    pub fn coriolis(&self, j: usize) -> f32 {
        let row = (j - self.gy) as f32;
        self.f + self.beta * (row - self.y_reference) * self.dy
    }

    /// Wind forcing `tau / rho_water` per component.
    pub fn wind_forcing(&self) -> (f32, f32) {
        (self.wind.0 / RHO_WATER, self.wind.1 / RHO_WATER)
    }

    pub fn ddx(&self, field: &Array2<f32>, j: usize, i: usize) -> f32 {
        (field[[j, i + 1]] - field[[j, i - 1]]) / (2.0 * self.dx)
    }

    pub fn ddy(&self, field: &Array2<f32>, j: usize, i: usize) -> f32 {
        (field[[j + 1, i]] - field[[j - 1, i]]) / (2.0 * self.dy)
    }

    pub fn laplacian(&self, field: &Array2<f32>, j: usize, i: usize) -> f32 {
        let centre = field[[j, i]];
        (field[[j, i + 1]] - 2.0 * centre + field[[j, i - 1]]) / (self.dx * self.dx)
            + (field[[j + 1, i]] - 2.0 * centre + field[[j - 1, i]]) / (self.dy * self.dy)
    }

    /// Apply periodic boundaries to all three fields.
    pub fn periodic(&self, mut state: StateSnapshot) -> StateSnapshot {
        fill_periodic(&mut state.eta, self.gx, self.gy);
        fill_periodic(&mut state.hu, self.gx, self.gy);
        fill_periodic(&mut state.hv, self.gx, self.gy);
        state
    }
}

/// Sub-step loop shared by the reference schemes.
///
/// `advance` computes the state one sub-step ahead (at most `max_dt`); it is
/// written into generation 1, which then becomes generation 0.
pub(crate) fn run_substeps<Q, F>(
    core: &mut SimulatorCore<Q>,
    max_dt: f32,
    t_end: f32,
    mut advance: F,
) -> Result<f32>
where
    Q: CommandQueue,
    F: FnMut(&SimulatorCore<Q>, f32) -> Result<StateSnapshot>,
{
    core.ensure_open()?;
    if core.next_substep(max_dt, t_end)?.is_none() {
        return Ok(core.time());
    }
    core.mark_stepping()?;

    let mut substeps = 0usize;
    while let Some(dt) = core.next_substep(max_dt, t_end)? {
        let next = advance(core, dt)?;
        if !next.is_finite() {
            return Err(SimulatorError::NonFinite {
                t: core.time() + dt,
            });
        }
        core.write_generation(Generation::One, &next.view())?;
        core.swap_generations()?;
        core.complete_substep(dt, t_end);
        substeps += 1;
    }

    tracing::debug!(
        "{} advanced to t = {} in {} sub-steps",
        core.scheme().name,
        core.time(),
        substeps
    );
    Ok(core.time())
}

/// Configuration, parameters and padded state for a hotstart.
pub(crate) struct Hotstart {
    pub config: SimulationConfig,
    pub parameters: ReferenceParameters,
    pub state: StateSnapshot,
}

/// Read the last timestep of a checkpoint written by `scheme`.
pub(crate) fn hotstart(path: &Path, continue_writing: bool, scheme: &str) -> Result<Hotstart> {
    let checkpoint = Checkpoint::load(path)?;
    let header = checkpoint.header;
    if header.scheme != scheme {
        return Err(SimulatorError::Checkpoint(format!(
            "{} was written by scheme `{}`, not `{}`",
            path.display(),
            header.scheme,
            scheme
        )));
    }

    let mut config = header.config;
    config.t0 = checkpoint.last.t;
    if continue_writing {
        config.output.write_checkpoints = true;
        config.output.checkpoint_path = Some(continuation_path(path));
    } else {
        config.output.write_checkpoints = false;
    }

    let mut state = checkpoint.last.to_snapshot()?;
    if !header.ghost_cells_included {
        state = state.padded(config.ghost_cells.x, config.ghost_cells.y);
    }
    if state.shape() != config.padded_shape() {
        return Err(SimulatorError::shape_mismatch(
            format!("checkpoint {} frame", path.display()),
            config.padded_shape(),
            state.shape(),
        ));
    }
    let (gx, gy) = (config.ghost_cells.x, config.ghost_cells.y);
    for field in [&mut state.eta, &mut state.hu, &mut state.hv] {
        fill_periodic(field, gx, gy);
    }

    Ok(Hotstart {
        parameters: serde_json::from_value(header.parameters)?,
        config,
        state,
    })
}
