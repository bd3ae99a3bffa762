//! Shallow-Water Ensembles
//!
//! Runs many simulators of one scheme side by side on a single device and
//! moves state between them. This crate provides:
//! - Ensemble configuration loading and validation
//! - Ensemble construction with perturbed initial states
//! - Lockstep stepping with per-member checkpoint files
//! - Resampling through cross-simulator state copies

#![warn(missing_docs)]

pub mod config;
pub mod ensemble;
pub mod error;
pub mod resample;

pub use config::{EnsembleConfig, InitialBump, SchemeKind};
pub use ensemble::Ensemble;
pub use error::{EnsembleError, Result};
pub use resample::{plan_copies, systematic_resample, CopyOp};

use ndarray::Array2;
use std::path::Path;
use swe_simulator::{Ctcs, Device, Fbl, Simulator, StateSnapshot};

/// Create an ensemble from a configuration file
///
/// Loads and validates the configuration, then builds the members with
/// [`build_ensemble`].
///
/// # Example
/// ```no_run
/// use swe_ensemble::create_ensemble;
/// use swe_simulator::HostDevice;
///
/// let mut ensemble = create_ensemble("config/bumps.json", &HostDevice)?;
/// ensemble.step_all(600.0)?;
/// let mean = ensemble.mean_state()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_ensemble<D: Device>(
    config_path: impl AsRef<Path>,
    device: &D,
) -> Result<Ensemble<D::Queue>> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating ensemble from config: {}", config_path.display());
    let config = EnsembleConfig::load(config_path)?;
    build_ensemble(&config, device)
}

/// Build the members of `config` on `device` and upload their initial states.
///
/// Member `i` starts from a Gaussian bump whose amplitude is scaled by
/// `1 + spread * s_i`, with `s_i` running evenly from -1 to 1 across the
/// ensemble. With checkpoint writing enabled every member writes its own file.
pub fn build_ensemble<D: Device>(config: &EnsembleConfig, device: &D) -> Result<Ensemble<D::Queue>> {
    config.validate()?;

    let mut members: Vec<Box<dyn Simulator<D::Queue>>> = Vec::with_capacity(config.members);
    for index in 0..config.members {
        let member_config = config.member_config(index);
        let mut member: Box<dyn Simulator<D::Queue>> = match config.scheme {
            SchemeKind::Fbl => Box::new(Fbl::new(device, member_config, config.mean_depth)?),
            SchemeKind::Ctcs => Box::new(Ctcs::new(device, member_config, config.mean_depth)?),
        };
        let initial = initial_state(config, index);
        member.upload(initial.view(), None)?;
        members.push(member);
    }

    tracing::info!(
        "Ensemble `{}`: {} {} members on {}",
        config.name,
        config.members,
        config.scheme.name(),
        device.name()
    );
    Ok(Ensemble::new(config.name.clone(), members))
}

/// Initial state of member `index`: a Gaussian bump centred in the interior,
/// at rest, with zero ghost cells.
pub fn initial_state(config: &EnsembleConfig, index: usize) -> StateSnapshot {
    let bump = &config.initial_bump;
    let sim = &config.simulation;

    let offset = if config.members > 1 {
        2.0 * index as f32 / (config.members - 1) as f32 - 1.0
    } else {
        0.0
    };
    let amplitude = bump.amplitude * (1.0 + bump.spread * offset);

    let (cx, cy) = ((sim.nx as f32 - 1.0) / 2.0, (sim.ny as f32 - 1.0) / 2.0);
    let two_sigma2 = 2.0 * bump.width * bump.width;
    let eta = Array2::from_shape_fn((sim.ny, sim.nx), |(j, i)| {
        let r2 = (i as f32 - cx).powi(2) + (j as f32 - cy).powi(2);
        amplitude * (-r2 / two_sigma2).exp()
    });
    let interior = StateSnapshot::new(
        eta,
        Array2::zeros((sim.ny, sim.nx)),
        Array2::zeros((sim.ny, sim.nx)),
    );
    interior.padded(sim.ghost_cells.x, sim.ghost_cells.y)
}
