//! Ensemble of simulators sharing one device.

use std::collections::BTreeMap;

use swe_simulator::{CommandQueue, DrifterState, Simulator, StateSnapshot, WindStress};

use crate::error::{EnsembleError, Result};
use crate::resample::{plan_copies, CopyOp};

/// A set of simulators of one scheme, stepped in lockstep.
pub struct Ensemble<Q: CommandQueue> {
    name: String,
    members: Vec<Box<dyn Simulator<Q>>>,
}

impl<Q: CommandQueue> Ensemble<Q> {
    /// Wrap already constructed members.
    pub fn new(name: impl Into<String>, members: Vec<Box<dyn Simulator<Q>>>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    /// Ensemble name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the ensemble has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All members.
    pub fn members(&self) -> &[Box<dyn Simulator<Q>>] {
        &self.members
    }

    /// Member `index`, if it exists.
    pub fn member(&self, index: usize) -> Option<&dyn Simulator<Q>> {
        self.members.get(index).map(|m| m.as_ref())
    }

    /// Member `index` mutably, if it exists.
    pub fn member_mut(&mut self, index: usize) -> Option<&mut (dyn Simulator<Q> + 'static)> {
        self.members.get_mut(index).map(|m| m.as_mut())
    }

    /// Advance every member to `t_end`.
    pub fn step_all(&mut self, t_end: f32) -> Result<()> {
        for (index, member) in self.members.iter_mut().enumerate() {
            member.step(t_end).map_err(|e| {
                tracing::error!("Member {} of `{}` failed to step: {}", index, self.name, e);
                e
            })?;
        }
        tracing::debug!("Stepped {} members of `{}` to t = {}", self.members.len(), self.name, t_end);
        Ok(())
    }

    /// Step to `t_end`, writing a checkpoint frame for every member at the
    /// start and after each `output_interval`. Without an interval, frames
    /// are written at the start and at `t_end` only.
    pub fn run(&mut self, t_end: f32, output_interval: Option<f32>) -> Result<()> {
        let mut t = self
            .members
            .iter()
            .map(|m| m.time())
            .fold(f32::INFINITY, f32::min);
        if !t.is_finite() {
            return Ok(());
        }
        let interval = output_interval.unwrap_or(f32::INFINITY);
        if interval.is_nan() || interval <= 0.0 {
            return Err(EnsembleError::Config(format!(
                "output interval must be positive, got {}",
                interval
            )));
        }

        tracing::info!("Running ensemble `{}` from t = {} to t = {}", self.name, t, t_end);
        self.write_checkpoints()?;
        while t < t_end {
            let next = (t + interval).min(t_end);
            if next <= t {
                return Err(EnsembleError::Config(format!(
                    "output interval {} cannot advance t = {} towards t_end = {}",
                    interval, t, t_end
                )));
            }
            self.step_all(next)?;
            let written = self.write_checkpoints()?;
            tracing::debug!("t = {}: wrote {} checkpoint frames", next, written);
            t = next;
        }
        Ok(())
    }

    /// Write a checkpoint frame for every member with a bound writer and
    /// return how many were written.
    pub fn write_checkpoints(&mut self) -> Result<usize> {
        let mut written = 0;
        for member in &mut self.members {
            if member.write_checkpoint()? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Generation 0 of every member.
    pub fn download_all(&self) -> Result<Vec<StateSnapshot>> {
        self.members
            .iter()
            .map(|m| m.download().map_err(EnsembleError::from))
            .collect()
    }

    /// Cell-wise mean of generation 0 over all members.
    pub fn mean_state(&self) -> Result<StateSnapshot> {
        let mut states = self.download_all()?.into_iter();
        let mut mean = states
            .next()
            .ok_or_else(|| EnsembleError::Config("mean of an empty ensemble".into()))?;
        for state in states {
            mean.eta += &state.eta;
            mean.hu += &state.hu;
            mean.hv += &state.hv;
        }
        let n = self.members.len() as f32;
        for field in [&mut mean.eta, &mut mean.hu, &mut mean.hv] {
            field.mapv_inplace(|v| v / n);
        }
        Ok(mean)
    }

    /// Replace member `i` with the state of member `parents[i]`, for all `i`
    /// at once.
    ///
    /// Device copies go through [`Simulator::copy_state`]. Members caught in
    /// a cycle are staged on the host with both grid generations, their wind
    /// stress and their drifter positions, and restored from there.
    pub fn resample(&mut self, parents: &[usize]) -> Result<()> {
        if parents.len() != self.members.len() {
            return Err(EnsembleError::InvalidResample(format!(
                "{} parents given for {} members",
                parents.len(),
                self.members.len()
            )));
        }
        let plan = plan_copies(parents)?;
        let mut staged: BTreeMap<usize, Staged> = BTreeMap::new();

        for op in &plan {
            match *op {
                CopyOp::Copy { target, source } => {
                    let (dst, src) = pair_mut(&mut self.members, target, source);
                    dst.copy_state(src.as_ref())?;
                }
                CopyOp::Stage { member } => {
                    staged.insert(member, Staged::download(self.members[member].as_ref())?);
                }
                CopyOp::CopyStaged { target, member } => {
                    let state = staged.get(&member).ok_or_else(|| {
                        EnsembleError::InvalidResample(format!("member {} was never staged", member))
                    })?;
                    state.restore(self.members[target].as_mut())?;
                }
            }
        }

        tracing::info!(
            "Resampled `{}`: {} copies, {} staged",
            self.name,
            plan.len() - staged.len(),
            staged.len()
        );
        Ok(())
    }

    /// Release every member. All members are released even if one fails; the
    /// first error is returned.
    pub fn release(&mut self) -> Result<()> {
        let mut first_error = None;
        for (index, member) in self.members.iter_mut().enumerate() {
            if let Err(e) = member.release() {
                tracing::warn!("Releasing member {} of `{}` failed: {}", index, self.name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Host copy of a member taken while resampling.
struct Staged {
    current: StateSnapshot,
    previous: StateSnapshot,
    wind_stress: WindStress,
    drifters: Option<DrifterState>,
}

impl Staged {
    fn download<Q: CommandQueue>(sim: &dyn Simulator<Q>) -> Result<Self> {
        Ok(Self {
            current: sim.download()?,
            previous: sim.download_prev_timestep()?,
            wind_stress: sim.core().wind_stress(),
            drifters: sim.core().drifter_state()?,
        })
    }

    /// Same effect as `copy_state` from the staged member. Drifters go
    /// first so a poisoned tracker fails before the grid is touched.
    fn restore<Q: CommandQueue>(&self, sim: &mut dyn Simulator<Q>) -> Result<()> {
        if let Some(drifters) = &self.drifters {
            sim.core().restore_drifter_state(drifters)?;
        }
        sim.upload(self.current.view(), Some(self.previous.view()))?;
        sim.core_mut().set_wind_stress(self.wind_stress);
        Ok(())
    }
}

/// Mutable `target` and shared `source` from one slice; the indices differ.
fn pair_mut<T>(items: &mut [T], target: usize, source: usize) -> (&mut T, &T) {
    if target < source {
        let (low, high) = items.split_at_mut(source);
        (&mut low[target], &high[0])
    } else {
        let (low, high) = items.split_at_mut(target);
        (&mut high[0], &low[source])
    }
}
