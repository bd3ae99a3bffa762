//! Forward-backward linear scheme.

use std::path::Path;

use super::{
    check_reference_config, fill_periodic, gravity_wave_dt, hotstart, run_substeps,
    ReferenceParameters, Stencil,
};
use crate::config::SimulationConfig;
use crate::device::{CommandQueue, Device};
use crate::error::Result;
use crate::runtime::{SchemeInfo, SimulatorCore};
use crate::state::StateSnapshot;
use crate::Simulator;

/// Forward-backward linear shallow-water scheme.
///
/// Each sub-step updates `hu` from the old state, then `hv` using the new
/// `hu` in the Coriolis term, then `eta` from the divergence of the new
/// fluxes. Friction is treated implicitly.
pub struct Fbl<Q: CommandQueue> {
    core: SimulatorCore<Q>,
    mean_depth: f32,
    dt: f32,
}

impl<Q: CommandQueue> Fbl<Q> {
    /// Registry name.
    pub const NAME: &'static str = "fbl";

    /// Build a simulator with constant mean depth `mean_depth` (m).
    pub fn new<D>(device: &D, config: SimulationConfig, mean_depth: f32) -> Result<Self>
    where
        D: Device<Queue = Q>,
    {
        check_reference_config(Self::NAME, &config, mean_depth)?;
        let dt = gravity_wave_dt(&config, mean_depth);
        let parameters = serde_json::to_value(ReferenceParameters { mean_depth })?;
        let core = SimulatorCore::new(device, config, SchemeInfo::new(Self::NAME, parameters))?;
        Ok(Self {
            core,
            mean_depth,
            dt,
        })
    }

    /// Mean water depth (m).
    pub fn mean_depth(&self) -> f32 {
        self.mean_depth
    }

    /// Sub-step length (s).
    pub fn dt(&self) -> f32 {
        self.dt
    }
}

fn forward_backward(stencil: &Stencil, current: &StateSnapshot, dt: f32) -> StateSnapshot {
    let (gx, gy) = (stencil.gx, stencil.gy);
    let gh = stencil.g * stencil.h;
    let friction = 1.0 + dt * stencil.r / stencil.h;
    let (wind_x, wind_y) = stencil.wind_forcing();
    let mut next = current.clone();

    for (j, i) in stencil.cells() {
        let rhs = -gh * stencil.ddx(&current.eta, j, i)
            + stencil.coriolis(j) * current.hv[[j, i]]
            + wind_x;
        next.hu[[j, i]] = (current.hu[[j, i]] + dt * rhs) / friction;
    }
    fill_periodic(&mut next.hu, gx, gy);

    for (j, i) in stencil.cells() {
        let rhs = -gh * stencil.ddy(&current.eta, j, i)
            - stencil.coriolis(j) * next.hu[[j, i]]
            + wind_y;
        next.hv[[j, i]] = (current.hv[[j, i]] + dt * rhs) / friction;
    }
    fill_periodic(&mut next.hv, gx, gy);

    for (j, i) in stencil.cells() {
        let divergence = stencil.ddx(&next.hu, j, i) + stencil.ddy(&next.hv, j, i);
        next.eta[[j, i]] = current.eta[[j, i]] - dt * divergence;
    }
    fill_periodic(&mut next.eta, gx, gy);

    next
}

impl<Q: CommandQueue> Simulator<Q> for Fbl<Q> {
    fn core(&self) -> &SimulatorCore<Q> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SimulatorCore<Q> {
        &mut self.core
    }

    fn scheme_name(&self) -> &'static str {
        Self::NAME
    }

    fn step(&mut self, t_end: f32) -> Result<f32> {
        let mean_depth = self.mean_depth;
        run_substeps(&mut self.core, self.dt, t_end, |core, dt| {
            let stencil = Stencil::new(core.config(), core.wind_stress(), mean_depth);
            let current = stencil.periodic(core.download()?);
            Ok(forward_backward(&stencil, &current, dt))
        })
    }

    fn clean_up(&mut self) -> Result<()> {
        // Host-evaluated stencils own no pipelines
        Ok(())
    }

    fn from_checkpoint<D>(device: &D, path: &Path, continue_writing: bool) -> Result<Self>
    where
        D: Device<Queue = Q>,
    {
        let restored = hotstart(path, continue_writing, Self::NAME)?;
        let mut simulator = Self::new(device, restored.config, restored.parameters.mean_depth)?;
        simulator.upload(restored.state.view(), None)?;
        tracing::info!(
            "Hotstarted {} from {} at t = {}",
            Self::NAME,
            path.display(),
            simulator.time()
        );
        Ok(simulator)
    }
}

impl<Q: CommandQueue> Drop for Fbl<Q> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Releasing {} simulator on drop failed: {}", Self::NAME, e);
        }
    }
}
