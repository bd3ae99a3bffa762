//! Scheme registry for restoring simulators from checkpoints.

use std::collections::BTreeMap;
use std::path::Path;

use crate::checkpoint::Checkpoint;
use crate::device::Device;
use crate::error::{Result, SimulatorError};
use crate::schemes::{Ctcs, Fbl};
use crate::Simulator;

/// Boxed simulator on the queue type of `D`.
pub type BoxedSimulator<D> = Box<dyn Simulator<<D as Device>::Queue>>;

/// Function rebuilding a simulator from a checkpoint file.
pub type Restorer<D> = fn(&D, &Path, bool) -> Result<BoxedSimulator<D>>;

/// Maps scheme names, as recorded in checkpoint headers, to restorers.
pub struct SchemeRegistry<D: Device> {
    restorers: BTreeMap<String, Restorer<D>>,
}

fn restore_as<S, D>(device: &D, path: &Path, continue_writing: bool) -> Result<BoxedSimulator<D>>
where
    D: Device,
    S: Simulator<D::Queue>,
{
    Ok(Box::new(S::from_checkpoint(device, path, continue_writing)?))
}

impl<D: Device> SchemeRegistry<D> {
    /// Registry with no schemes.
    pub fn new() -> Self {
        Self {
            restorers: BTreeMap::new(),
        }
    }

    /// Registry with the bundled `fbl` and `ctcs` schemes.
    pub fn with_reference_schemes() -> Self {
        let mut registry = Self::new();
        registry.register_scheme::<Fbl<D::Queue>>(Fbl::<D::Queue>::NAME);
        registry.register_scheme::<Ctcs<D::Queue>>(Ctcs::<D::Queue>::NAME);
        registry
    }

    /// Register a restorer under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, restorer: Restorer<D>) {
        self.restorers.insert(name.into(), restorer);
    }

    /// Register `S::from_checkpoint` under `name`.
    pub fn register_scheme<S>(&mut self, name: impl Into<String>)
    where
        S: Simulator<D::Queue>,
    {
        self.register(name, restore_as::<S, D>);
    }

    /// Registered scheme names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.restorers.keys().map(String::as_str).collect()
    }

    /// Whether `name` has a restorer.
    pub fn contains(&self, name: &str) -> bool {
        self.restorers.contains_key(name)
    }

    /// Rebuild the simulator that wrote the checkpoint at `path`.
    pub fn restore(
        &self,
        device: &D,
        path: impl AsRef<Path>,
        continue_writing: bool,
    ) -> Result<BoxedSimulator<D>> {
        let path = path.as_ref();
        let header = Checkpoint::read_header(path)?;
        let restorer =
            self.restorers
                .get(&header.scheme)
                .ok_or_else(|| SimulatorError::NotImplemented {
                    scheme: header.scheme.clone(),
                    capability: "from_checkpoint",
                })?;
        tracing::debug!("Restoring {} simulator from {}", header.scheme, path.display());
        restorer(device, path, continue_writing)
    }
}

impl<D: Device> Default for SchemeRegistry<D> {
    fn default() -> Self {
        Self::with_reference_schemes()
    }
}
