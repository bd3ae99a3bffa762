//! Host/device state transfer: upload, download and the previous-timestep view.

use ndarray::Array2;
use swe_simulator::{
    Fbl, FieldTriple, HostDevice, HostQueue, SimulationConfig, Simulator, SimulatorError,
    StateSnapshot,
};

fn simulator(nx: usize, ny: usize) -> Fbl<HostQueue> {
    let config = SimulationConfig::new(nx, ny, 1000.0, 1000.0);
    Fbl::new(&HostDevice, config, 10.0).unwrap()
}

/// Distinct, non-trivial values in every field.
fn pattern(shape: (usize, usize), seed: f32) -> StateSnapshot {
    let field = |scale: f32| {
        Array2::from_shape_fn(shape, |(j, i)| {
            seed + scale * ((j * 31 + i * 7) as f32).sin()
        })
    };
    StateSnapshot::new(field(0.1), field(2.5), field(-1.75))
}

#[test]
fn test_upload_without_previous_sets_both_generations() {
    let mut sim = simulator(12, 8);
    let shape = sim.config().padded_shape();
    let state = pattern(shape, 0.5);

    sim.upload(state.view(), None).unwrap();

    let current = sim.download().unwrap();
    let previous = sim.download_prev_timestep().unwrap();
    assert_eq!(current, previous);
}

#[test]
fn test_upload_download_round_trip() {
    let mut sim = simulator(5, 9);
    let shape = sim.config().padded_shape();
    assert_eq!(shape, (11, 7));
    let state = pattern(shape, -3.0);

    sim.upload(state.view(), None).unwrap();

    assert_eq!(sim.download().unwrap(), state);
}

#[test]
fn test_upload_with_explicit_previous() {
    let mut sim = simulator(6, 6);
    let shape = sim.config().padded_shape();
    let current = pattern(shape, 1.0);
    let previous = pattern(shape, 2.0);

    sim.upload(current.view(), Some(previous.view())).unwrap();

    assert_eq!(sim.download().unwrap(), current);
    assert_eq!(sim.download_prev_timestep().unwrap(), previous);
}

#[test]
fn test_upload_rejects_unpadded_fields() {
    let mut sim = simulator(10, 10);
    let interior = pattern((10, 10), 1.0);

    let err = sim.upload(interior.view(), None).unwrap_err();
    match err {
        SimulatorError::ShapeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, (12, 12));
            assert_eq!(actual, (10, 10));
        }
        other => panic!("expected ShapeMismatch, got {other}"),
    }

    // Nothing was written
    assert_eq!(sim.download().unwrap(), StateSnapshot::zeros((12, 12)));
}

#[test]
fn test_upload_rejects_mismatched_previous_field() {
    let mut sim = simulator(4, 4);
    let shape = sim.config().padded_shape();
    let current = pattern(shape, 1.0);
    let mut previous = pattern(shape, 2.0);
    previous.hu = Array2::zeros((shape.0, shape.1 + 1));

    let err = sim.upload(current.view(), Some(previous.view())).unwrap_err();
    assert!(
        matches!(&err, SimulatorError::ShapeMismatch { context, .. } if context.contains("hu")),
        "unexpected error: {err}"
    );
    assert_eq!(sim.download().unwrap(), StateSnapshot::zeros(shape));
}

#[test]
fn test_upload_accepts_borrowed_views() {
    let mut sim = simulator(3, 3);
    let shape = sim.config().padded_shape();
    let eta = Array2::from_elem(shape, 0.25);
    let hu = Array2::from_elem(shape, -1.0);
    let hv = Array2::from_elem(shape, 4.0);

    sim.upload(FieldTriple::new(eta.view(), hu.view(), hv.view()), None)
        .unwrap();

    let back = sim.download_prev_timestep().unwrap();
    assert_eq!(back.eta, eta);
    assert_eq!(back.hu, hu);
    assert_eq!(back.hv, hv);
}

#[test]
fn test_upload_generations_from_separate_arrays() {
    let mut sim = simulator(4, 3);
    let shape = sim.config().padded_shape();
    let current = pattern(shape, 2.0);

    {
        let eta = Array2::from_elem(shape, -0.5);
        let hu = Array2::from_elem(shape, 3.0);
        let hv = Array2::from_elem(shape, 0.75);
        let sim: &mut dyn Simulator<HostQueue> = &mut sim;
        sim.upload(
            current.view(),
            Some(FieldTriple::new(eta.view(), hu.view(), hv.view())),
        )
        .unwrap();
    }

    assert_eq!(sim.download().unwrap(), current);
    let previous = sim.download_prev_timestep().unwrap();
    assert!(previous.eta.iter().all(|&v| v == -0.5));
    assert!(previous.hu.iter().all(|&v| v == 3.0));
    assert!(previous.hv.iter().all(|&v| v == 0.75));
}
