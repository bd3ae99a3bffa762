//! Shallow-Water Simulator Runtime
//!
//! Shared runtime for time-stepping shallow-water solvers over a structured 2D
//! grid. Concrete schemes embed a [`SimulatorCore`] and implement the
//! [`Simulator`] trait; the core takes care of the device queue, the
//! double-buffered grid state, launch geometry, checkpoint output and drifter
//! attachment.
//!
//! # Modules
//! - [`config`] -- `SimulationConfig` with JSON loading and validation.
//! - [`device`] -- Device/queue/buffer traits, host backend, wgpu backend (`gpu` feature).
//! - [`state`] -- Two generations of `eta`, `hu`, `hv` and their host snapshots.
//! - [`geometry`] -- Work-group and global launch sizes.
//! - [`checkpoint`] -- JSON Lines checkpoint writer and hotstart reader.
//! - [`drifters`] -- Particle tracker attachment contract.
//! - [`schemes`] -- Forward-backward linear and leapfrog reference schemes.
//! - [`registry`] -- Restores a simulator of the right scheme from a checkpoint.
//! - [`runtime`] -- `SimulatorCore`, the state every scheme embeds.

#![warn(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod device;
pub mod drifters;
pub mod error;
pub mod geometry;
pub mod registry;
pub mod runtime;
pub mod schemes;
pub mod state;

use std::any::{type_name, Any, TypeId};
use std::path::Path;

pub use crate::checkpoint::{Checkpoint, CheckpointHeader, CheckpointWriter, JsonCheckpointWriter};
pub use crate::config::{SimulationConfig, WindStress};
pub use crate::device::{CommandQueue, Device, DeviceBuffer, HostDevice, HostQueue};
pub use crate::drifters::{DrifterSet, DrifterState, DrifterTracker, Position, SharedDrifters};
pub use crate::error::{DeviceError, Result, SimulatorError};
pub use crate::geometry::LaunchGeometry;
pub use crate::registry::SchemeRegistry;
pub use crate::runtime::{Lifecycle, SchemeInfo, SimulatorCore};
pub use crate::schemes::{Ctcs, Fbl};
pub use crate::state::{FieldTriple, FieldViews, Generation, StateSnapshot};

#[cfg(feature = "gpu")]
pub use crate::device::{gpu_available, WgpuDevice, WgpuQueue};

// ---------------------------------------------------------------------------
// Simulator trait
// ---------------------------------------------------------------------------

/// Trait that every concrete numerical scheme implements.
///
/// A scheme supplies the stepping kernel, its cleanup hook and a hotstart
/// constructor; everything else (state transfer, cross-simulator copies,
/// drifters, checkpoints and release) is provided on top of
/// [`SimulatorCore`].
///
/// Lifecycle: `Constructed -> Stepping -> Closed`. After [`release`](Self::release)
/// every operation except `release` and `close_checkpoint` fails with
/// [`SimulatorError::Closed`].
pub trait Simulator<Q: CommandQueue>: Any + Send {
    /// Shared runtime state.
    fn core(&self) -> &SimulatorCore<Q>;

    /// Shared runtime state, mutably.
    fn core_mut(&mut self) -> &mut SimulatorCore<Q>;

    /// Registry name of the scheme.
    fn scheme_name(&self) -> &'static str;

    /// Advance until the simulation time reaches `t_end` and return the new
    /// time. A call with `t_end` at or before the current time does nothing.
    fn step(&mut self, t_end: f32) -> Result<f32>;

    /// Release scheme-owned device resources (pipelines, scratch buffers).
    /// Called once by [`release`](Self::release).
    fn clean_up(&mut self) -> Result<()>;

    /// Rebuild a simulator from the last timestep of a checkpoint file.
    /// With `continue_writing`, checkpointing resumes into a new file next to
    /// `path`.
    fn from_checkpoint<D>(device: &D, path: &Path, continue_writing: bool) -> Result<Self>
    where
        D: Device<Queue = Q>,
        Self: Sized;

    /// Concrete type of the implementor, used to guard [`copy_state`](Self::copy_state).
    fn concrete_type(&self) -> (TypeId, &'static str) {
        (TypeId::of::<Self>(), type_name::<Self>())
    }

    /// Current simulation time.
    fn time(&self) -> f32 {
        self.core().time()
    }

    /// Simulation configuration.
    fn config(&self) -> &SimulationConfig {
        self.core().config()
    }

    /// Launch geometry.
    fn launch_geometry(&self) -> LaunchGeometry {
        self.core().launch_geometry()
    }

    /// Generation 0 (state at the current time) on the host.
    fn download(&self) -> Result<StateSnapshot> {
        self.core().download()
    }

    /// Generation 1 on the host.
    fn download_prev_timestep(&self) -> Result<StateSnapshot> {
        self.core().download_prev_timestep()
    }

    /// Upload host fields into generation 0. Generation 1 receives `previous`
    /// if given, otherwise a copy of `current`.
    fn upload<'a>(&mut self, current: FieldViews<'a>, previous: Option<FieldViews<'a>>) -> Result<()> {
        self.core_mut().upload(&current, previous.as_ref())
    }

    /// Overwrite this simulator's state with the state of `other`.
    ///
    /// Both generations, the wind stress and (when both sides have drifters)
    /// drifter positions are copied. `other` must be the same concrete type
    /// with the same `(ny, nx)`; otherwise nothing is modified.
    fn copy_state(&mut self, other: &dyn Simulator<Q>) -> Result<()> {
        let (source_id, source_type) = other.concrete_type();
        let (target_id, target_type) = self.concrete_type();
        if source_id != target_id {
            return Err(SimulatorError::TypeMismatch {
                source_type,
                target_type,
            });
        }
        self.core_mut().copy_state_from(other.core())
    }

    /// Attach an externally owned drifter tracker. Rebinding replaces the
    /// previous tracker.
    fn attach_drifters(&mut self, tracker: &SharedDrifters<Q>) -> Result<()> {
        self.core_mut().attach_drifters(tracker)
    }

    /// Whether a live drifter tracker is attached.
    fn has_drifters(&self) -> bool {
        self.core().has_drifters()
    }

    /// Write the current state to the bound checkpoint writer.
    fn write_checkpoint(&mut self) -> Result<bool> {
        self.core_mut().write_checkpoint()
    }

    /// Finalize the checkpoint writer. Safe to call repeatedly.
    fn close_checkpoint(&mut self) -> Result<()> {
        self.core_mut().close_checkpoint()
    }

    /// Close the checkpoint, run [`clean_up`](Self::clean_up) and free the
    /// grid state. Every step runs even if an earlier one fails; the first
    /// error is returned. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()> {
        if self.core().is_closed() {
            return Ok(());
        }
        let mut first_error = None;

        if let Err(e) = self.close_checkpoint() {
            tracing::warn!("Closing checkpoint of {} failed: {}", self.scheme_name(), e);
            first_error = Some(e);
        }
        if let Err(e) = self.clean_up() {
            tracing::warn!("Cleanup of {} failed: {}", self.scheme_name(), e);
            first_error.get_or_insert(e);
        }
        self.core_mut().free();
        tracing::debug!("Released {} simulator at t = {}", self.scheme_name(), self.time());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
