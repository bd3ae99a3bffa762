//! State shared by every concrete scheme.
//!
//! [`SimulatorCore`] owns the configuration, the command queue, the grid state
//! store and the optional collaborators. Schemes embed one and expose it
//! through [`Simulator::core`](crate::Simulator::core); the provided trait
//! methods forward to it.

use std::sync::{Arc, Mutex, Weak};

use crate::checkpoint::{CheckpointHeader, CheckpointWriter, JsonCheckpointWriter};
use crate::config::{SimulationConfig, WindStress};
use crate::device::{CommandQueue, Device};
use crate::drifters::{DrifterState, DrifterTracker, SharedDrifters};
use crate::error::{Result, SimulatorError};
use crate::geometry::LaunchGeometry;
use crate::state::{FieldShape, FieldViews, Generation, GridState, StateSnapshot};

/// Where a simulator is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, not stepped yet
    Constructed,
    /// At least one `step` call has started
    Stepping,
    /// Released; only `release` and `close_checkpoint` remain valid
    Closed,
}

/// Name and parameters a scheme records in its checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeInfo {
    /// Registry name
    pub name: &'static str,
    /// Scheme-specific parameters, restored on hotstart
    pub parameters: serde_json::Value,
}

impl SchemeInfo {
    /// Scheme info with the given name and parameters.
    pub fn new(name: &'static str, parameters: serde_json::Value) -> Self {
        Self { name, parameters }
    }
}

type DrifterHandle<Q> = Weak<Mutex<dyn DrifterTracker<Q>>>;

/// Configuration, device queue and double-buffered state of one simulator.
pub struct SimulatorCore<Q: CommandQueue> {
    config: SimulationConfig,
    queue: Q,
    state: Option<GridState<Q::Buffer>>,
    geometry: LaunchGeometry,
    t: f32,
    wind_stress: WindStress,
    checkpoint: Option<Box<dyn CheckpointWriter>>,
    drifters: Option<DrifterHandle<Q>>,
    scheme: SchemeInfo,
    lifecycle: Lifecycle,
}

impl<Q: CommandQueue> SimulatorCore<Q> {
    /// Validate `config`, create a queue on `device`, allocate both state
    /// generations and open the checkpoint writer if requested.
    pub fn new<D>(device: &D, config: SimulationConfig, scheme: SchemeInfo) -> Result<Self>
    where
        D: Device<Queue = Q>,
    {
        config.validate()?;
        let geometry = LaunchGeometry::new(config.nx, config.ny, config.tile)?;
        let queue = device.create_queue()?;
        let state = GridState::allocate(&queue, FieldShape::from_config(&config))?;

        let checkpoint: Option<Box<dyn CheckpointWriter>> = match (
            config.output.write_checkpoints,
            config.output.checkpoint_path.as_ref(),
        ) {
            (true, Some(path)) => {
                let header = CheckpointHeader {
                    scheme: scheme.name.to_string(),
                    parameters: scheme.parameters.clone(),
                    config: config.clone(),
                    ghost_cells_included: !config.output.ignore_ghost_cells,
                };
                Some(Box::new(JsonCheckpointWriter::create(path, &header)?))
            }
            _ => None,
        };

        tracing::info!(
            "Constructed {} simulator on {}: {}x{} cells, {}x{} ghost, global size {:?}",
            scheme.name,
            device.name(),
            config.nx,
            config.ny,
            config.ghost_cells.x,
            config.ghost_cells.y,
            geometry.global_size
        );

        Ok(Self {
            t: config.t0,
            wind_stress: config.wind_stress,
            config,
            queue,
            state: Some(state),
            geometry,
            checkpoint,
            drifters: None,
            scheme,
            lifecycle: Lifecycle::Constructed,
        })
    }

    /// Simulation configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Command queue owned by this simulator.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Launch geometry computed at construction.
    pub fn launch_geometry(&self) -> LaunchGeometry {
        self.geometry
    }

    /// Current simulation time.
    pub fn time(&self) -> f32 {
        self.t
    }

    /// Wind stress currently applied.
    pub fn wind_stress(&self) -> WindStress {
        self.wind_stress
    }

    /// Replace the wind stress, as when restoring a staged state.
    pub fn set_wind_stress(&mut self, wind_stress: WindStress) {
        self.wind_stress = wind_stress;
    }

    /// Scheme name and parameters.
    pub fn scheme(&self) -> &SchemeInfo {
        &self.scheme
    }

    /// Lifecycle stage.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the core has been freed.
    pub fn is_closed(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    /// Fail with [`SimulatorError::Closed`] after release.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SimulatorError::Closed);
        }
        Ok(())
    }

    /// Grid state store.
    pub fn state(&self) -> Result<&GridState<Q::Buffer>> {
        self.state.as_ref().ok_or(SimulatorError::Closed)
    }

    // -----------------------------------------------------------------------
    // State transfer
    // -----------------------------------------------------------------------

    /// Generation 0 on the host.
    pub fn download(&self) -> Result<StateSnapshot> {
        self.state()?.download(&self.queue, Generation::Zero)
    }

    /// Generation 1 on the host.
    pub fn download_prev_timestep(&self) -> Result<StateSnapshot> {
        self.state()?.download(&self.queue, Generation::One)
    }

    /// Write `current` into generation 0 and `previous` (or `current` again)
    /// into generation 1. Nothing is written if any shape is wrong.
    pub fn upload<'a>(
        &mut self,
        current: &FieldViews<'a>,
        previous: Option<&FieldViews<'a>>,
    ) -> Result<()> {
        let state = self.state()?;
        state.check_shapes(current, "uploaded")?;
        if let Some(previous) = previous {
            state.check_shapes(previous, "uploaded previous-timestep")?;
        }
        state.write(&self.queue, Generation::Zero, current)?;
        state.write(&self.queue, Generation::One, previous.unwrap_or(current))?;
        self.queue.finish()?;
        Ok(())
    }

    /// Copy both generations, the wind stress and drifter positions from
    /// `other`. The caller has already checked the concrete types.
    pub fn copy_state_from(&mut self, other: &SimulatorCore<Q>) -> Result<()> {
        self.ensure_open()?;
        other.ensure_open()?;

        let (expected, actual) = (self.config.domain_shape(), other.config.domain_shape());
        if expected != actual {
            return Err(SimulatorError::shape_mismatch(
                format!(
                    "cannot copy the state of a {} simulator into another with different domain size",
                    other.scheme.name
                ),
                expected,
                actual,
            ));
        }

        // Read the source positions, then hold the target lock across the
        // device copy. A poisoned tracker fails the copy before anything changes.
        let drifters = match (self.drifters(), other.drifters()) {
            (Some(mine), Some(theirs)) if Arc::ptr_eq(&mine, &theirs) => {
                tracing::debug!("Source and target share one drifter tracker, positions kept");
                None
            }
            (Some(mine), Some(theirs)) => Some((mine, read_drifters(&theirs)?)),
            _ => None,
        };
        let mut target = match &drifters {
            Some((mine, _)) => Some(
                mine.lock()
                    .map_err(|_| SimulatorError::Drifters("target tracker lock poisoned".into()))?,
            ),
            None => None,
        };

        self.state()?.copy_from(&self.queue, other.state()?)?;
        self.queue.finish()?;
        self.wind_stress = other.wind_stress;

        if let (Some(target), Some((_, state))) = (target.as_mut(), &drifters) {
            target.set_particle_positions(&state.particles);
            target.set_observation_position(state.observation);
        }

        tracing::debug!(
            "Copied {} state at t = {} into simulator at t = {}",
            other.scheme.name,
            other.t,
            self.t
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stepping support for schemes
    // -----------------------------------------------------------------------

    /// Enter the stepping stage.
    pub fn mark_stepping(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.lifecycle = Lifecycle::Stepping;
        Ok(())
    }

    /// Length of the next sub-step towards `t_end`, or `None` once there.
    ///
    /// Fails when `dt` is not positive or is too small to move `t` at its
    /// current magnitude, since the loop would never reach `t_end`.
    pub fn next_substep(&self, dt: f32, t_end: f32) -> Result<Option<f32>> {
        if self.t >= t_end {
            return Ok(None);
        }
        let remaining = t_end - self.t;
        if !(dt > 0.0) || (dt < remaining && self.t + dt <= self.t) {
            return Err(SimulatorError::configuration(format!(
                "time step {} cannot advance t = {} towards t_end = {}",
                dt, self.t, t_end
            )));
        }
        Ok(Some(dt.min(remaining)))
    }

    /// Advance time by a sub-step obtained from [`next_substep`](Self::next_substep).
    /// The final sub-step lands exactly on `t_end`.
    pub fn complete_substep(&mut self, dt: f32, t_end: f32) {
        self.t = if dt >= t_end - self.t {
            t_end
        } else {
            (self.t + dt).min(t_end)
        };
    }

    /// Overwrite one generation with host fields.
    pub fn write_generation(&self, generation: Generation, fields: &FieldViews<'_>) -> Result<()> {
        self.state()?.write(&self.queue, generation, fields)
    }

    /// Swap generations 0 and 1.
    pub fn swap_generations(&mut self) -> Result<()> {
        self.state.as_mut().ok_or(SimulatorError::Closed)?.swap();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    /// Hand this simulator's queue to `tracker` and keep a weak handle to it.
    pub fn attach_drifters(&mut self, tracker: &SharedDrifters<Q>) -> Result<()> {
        self.ensure_open()?;
        tracker
            .lock()
            .map_err(|_| SimulatorError::Drifters("tracker lock poisoned".into()))?
            .set_queue(self.queue.clone());
        self.drifters = Some(Arc::downgrade(tracker));
        tracing::debug!("Attached drifters to {} simulator", self.scheme.name);
        Ok(())
    }

    /// Attached tracker, if it is still alive.
    pub fn drifters(&self) -> Option<SharedDrifters<Q>> {
        self.drifters.as_ref().and_then(Weak::upgrade)
    }

    /// Whether a live tracker is attached.
    pub fn has_drifters(&self) -> bool {
        self.drifters().is_some()
    }

    /// Positions held by the attached tracker, if any.
    pub fn drifter_state(&self) -> Result<Option<DrifterState>> {
        self.drifters().map(|tracker| read_drifters(&tracker)).transpose()
    }

    /// Move the attached tracker's drifters to `state`. Returns `false` when
    /// no tracker is attached.
    pub fn restore_drifter_state(&self, state: &DrifterState) -> Result<bool> {
        let Some(tracker) = self.drifters() else {
            return Ok(false);
        };
        let mut tracker = tracker
            .lock()
            .map_err(|_| SimulatorError::Drifters("tracker lock poisoned".into()))?;
        tracker.set_particle_positions(&state.particles);
        tracker.set_observation_position(state.observation);
        Ok(true)
    }

    /// Bind a checkpoint writer, closing any previous one.
    pub fn bind_checkpoint_writer(&mut self, writer: Box<dyn CheckpointWriter>) -> Result<()> {
        self.ensure_open()?;
        if let Some(mut previous) = self.checkpoint.replace(writer) {
            previous.close()?;
        }
        Ok(())
    }

    /// Whether a checkpoint writer is bound.
    pub fn has_checkpoint_writer(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Write generation 0 at the current time. Returns `false` when no
    /// writer is bound.
    pub fn write_checkpoint(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.checkpoint.is_none() {
            return Ok(false);
        }
        let mut frame = self.download()?;
        if self.config.output.ignore_ghost_cells {
            frame = frame.interior(self.config.ghost_cells.x, self.config.ghost_cells.y);
        }
        let t = self.t;
        if let Some(writer) = self.checkpoint.as_mut() {
            writer.write_timestep(t, &frame)?;
        }
        Ok(true)
    }

    /// Close and unbind the checkpoint writer. No-op when none is bound.
    pub fn close_checkpoint(&mut self) -> Result<()> {
        if let Some(mut writer) = self.checkpoint.take() {
            writer.close()?;
        }
        Ok(())
    }

    /// Drop device buffers and the drifter handle, and mark the core closed.
    pub fn free(&mut self) {
        self.state = None;
        self.drifters = None;
        self.lifecycle = Lifecycle::Closed;
    }
}

fn read_drifters<Q: CommandQueue>(tracker: &SharedDrifters<Q>) -> Result<DrifterState> {
    let tracker = tracker
        .lock()
        .map_err(|_| SimulatorError::Drifters("source tracker lock poisoned".into()))?;
    Ok(DrifterState {
        particles: tracker.particle_positions(),
        observation: tracker.observation_position(),
    })
}
