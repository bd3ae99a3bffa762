//! End-to-end ensemble behaviour on the host backend.

use std::fs;
use std::path::Path;

use swe_ensemble::{
    build_ensemble, create_ensemble, initial_state, systematic_resample, Ensemble, EnsembleConfig,
    EnsembleError, InitialBump, SchemeKind,
};
use swe_simulator::{
    Checkpoint, DrifterSet, HostDevice, HostQueue, SharedDrifters, SimulationConfig, StateSnapshot,
    WindStress,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swe_ensemble=debug,swe_simulator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn config(scheme: SchemeKind, members: usize) -> EnsembleConfig {
    EnsembleConfig {
        name: "bumps".into(),
        scheme,
        mean_depth: 20.0,
        members,
        t_end: 120.0,
        output_interval: None,
        initial_bump: InitialBump {
            amplitude: 1.0,
            width: 2.5,
            spread: 0.5,
        },
        simulation: SimulationConfig::new(16, 12, 1000.0, 1000.0),
    }
}

/// Both generations of every member.
fn generations(ensemble: &Ensemble<HostQueue>) -> Vec<(StateSnapshot, StateSnapshot)> {
    ensemble
        .members()
        .iter()
        .map(|m| (m.download().unwrap(), m.download_prev_timestep().unwrap()))
        .collect()
}

fn stepped(scheme: SchemeKind, members: usize) -> Ensemble<HostQueue> {
    let mut ensemble = build_ensemble(&config(scheme, members), &HostDevice).unwrap();
    ensemble.step_all(60.0).unwrap();
    ensemble
}

#[test]
fn test_create_from_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ensemble.json");
    fs::write(
        &path,
        r#"{
            "name": "from-file",
            "scheme": "ctcs",
            "mean_depth": 15.0,
            "members": 3,
            "t_end": 300.0,
            "initial_bump": { "amplitude": 0.5 },
            "simulation": { "nx": 10, "ny": 8, "dx": 500.0, "dy": 500.0 }
        }"#,
    )
    .unwrap();

    let mut ensemble = create_ensemble(&path, &HostDevice).unwrap();
    assert_eq!(ensemble.name(), "from-file");
    assert_eq!(ensemble.len(), 3);
    assert!(ensemble.members().iter().all(|m| m.scheme_name() == "ctcs"));

    ensemble.step_all(30.0).unwrap();
    assert!(ensemble.members().iter().all(|m| m.time() == 30.0));
    ensemble.release().unwrap();
}

#[test]
fn test_run_fails_when_interval_cannot_advance_time() {
    let mut config = config(SchemeKind::Fbl, 2);
    config.simulation.t0 = 1.0e8;
    config.t_end = 1.0e8 + 64.0;
    let mut ensemble = build_ensemble(&config, &HostDevice).unwrap();

    assert!(matches!(
        ensemble.run(config.t_end, Some(1.0)),
        Err(EnsembleError::Config(_))
    ));
    assert!(ensemble.members().iter().all(|m| m.time() == 1.0e8));
}

#[test]
fn test_create_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, "{ \"name\": \"broken\" }").unwrap();
    assert!(matches!(
        create_ensemble(&path, &HostDevice),
        Err(EnsembleError::Json(_))
    ));

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        create_ensemble(&missing, &HostDevice),
        Err(EnsembleError::Io(_))
    ));
}

#[test]
fn test_members_start_from_perturbed_bumps() {
    let config = config(SchemeKind::Fbl, 3);
    let ensemble = build_ensemble(&config, &HostDevice).unwrap();

    for (index, member) in ensemble.members().iter().enumerate() {
        assert_eq!(member.download().unwrap(), initial_state(&config, index));
    }

    // Amplitudes 0.5, 1.0 and 1.5 average to the central member
    let mean = ensemble.mean_state().unwrap();
    let central = initial_state(&config, 1);
    for (m, c) in mean.eta.iter().zip(central.eta.iter()) {
        assert!((m - c).abs() < 1e-6);
    }
}

#[test]
fn test_mean_of_empty_ensemble_fails() {
    let ensemble: Ensemble<HostQueue> = Ensemble::new("empty", Vec::new());
    assert!(ensemble.is_empty());
    assert!(matches!(ensemble.mean_state(), Err(EnsembleError::Config(_))));
}

#[test]
fn test_identity_resample_changes_nothing() {
    let mut ensemble = stepped(SchemeKind::Fbl, 3);
    let before = generations(&ensemble);
    ensemble.resample(&[0, 1, 2]).unwrap();
    assert_eq!(generations(&ensemble), before);
}

#[test]
fn test_swap_resample_exchanges_states() {
    init_tracing();
    for scheme in [SchemeKind::Fbl, SchemeKind::Ctcs] {
        let mut ensemble = stepped(scheme, 3);
        let before = generations(&ensemble);
        assert_ne!(before[0], before[1]);

        ensemble.resample(&[1, 0, 2]).unwrap();

        let after = generations(&ensemble);
        assert_eq!(after[0], before[1]);
        assert_eq!(after[1], before[0]);
        assert_eq!(after[2], before[2]);
    }
}

#[test]
fn test_swap_resample_carries_wind_and_drifters() {
    init_tracing();
    let mut ensemble = stepped(SchemeKind::Fbl, 2);
    let winds = [
        WindStress::Uniform { tau_x: 1.0, tau_y: 0.0 },
        WindStress::Uniform { tau_x: 2.0, tau_y: 0.0 },
    ];
    let trackers: Vec<SharedDrifters<HostQueue>> = (0..2)
        .map(|i| {
            let x = 100.0 * (i + 1) as f32;
            let tracker: SharedDrifters<HostQueue> = DrifterSet::new(vec![[x, 50.0], [x, 75.0]])
                .with_observation([x, 0.0])
                .into_shared();
            tracker
        })
        .collect();
    for (index, (wind, tracker)) in winds.iter().zip(&trackers).enumerate() {
        let member = ensemble.member_mut(index).unwrap();
        member.core_mut().set_wind_stress(*wind);
        member.attach_drifters(tracker).unwrap();
    }
    let before = generations(&ensemble);

    ensemble.resample(&[1, 0]).unwrap();

    let after = generations(&ensemble);
    assert_eq!(after[0], before[1]);
    assert_eq!(after[1], before[0]);
    assert_eq!(ensemble.members()[0].core().wind_stress(), winds[1]);
    assert_eq!(ensemble.members()[1].core().wind_stress(), winds[0]);

    let positions = |i: usize| {
        let tracker = trackers[i].lock().unwrap();
        (tracker.particle_positions(), tracker.observation_position())
    };
    assert_eq!(positions(0), (vec![[200.0, 50.0], [200.0, 75.0]], [200.0, 0.0]));
    assert_eq!(positions(1), (vec![[100.0, 50.0], [100.0, 75.0]], [100.0, 0.0]));
}

#[test]
fn test_duplicating_resample() {
    let mut ensemble = stepped(SchemeKind::Fbl, 3);
    let before = generations(&ensemble);

    ensemble.resample(&[0, 0, 1]).unwrap();

    let after = generations(&ensemble);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[0]);
    assert_eq!(after[2], before[1]);

    // Duplicated members evolve identically afterwards
    ensemble.step_all(90.0).unwrap();
    let stepped = generations(&ensemble);
    assert_eq!(stepped[0], stepped[1]);
}

#[test]
fn test_invalid_resample_leaves_members_untouched() {
    let mut ensemble = stepped(SchemeKind::Fbl, 3);
    let before = generations(&ensemble);

    assert!(matches!(
        ensemble.resample(&[0, 1]),
        Err(EnsembleError::InvalidResample(_))
    ));
    assert!(matches!(
        ensemble.resample(&[2, 1, 3]),
        Err(EnsembleError::InvalidResample(_))
    ));
    assert_eq!(generations(&ensemble), before);
}

#[test]
fn test_systematic_resample_drives_ensemble() {
    let mut ensemble = stepped(SchemeKind::Fbl, 4);
    let before = generations(&ensemble);

    let parents = systematic_resample(&[0.0, 3.0, 0.0, 1.0], 0.5).unwrap();
    assert_eq!(parents, vec![1, 1, 1, 3]);
    ensemble.resample(&parents).unwrap();

    let after = generations(&ensemble);
    for (member, &parent) in parents.iter().enumerate() {
        assert_eq!(after[member], before[parent], "member {member}");
    }
}

#[test]
fn test_release_closes_every_member() {
    let mut ensemble = stepped(SchemeKind::Ctcs, 2);
    ensemble.release().unwrap();
    assert!(ensemble.step_all(90.0).is_err());
    assert!(ensemble.download_all().is_err());
    // Second release is a no-op
    ensemble.release().unwrap();
}

fn frames(path: &Path) -> (usize, f32) {
    let checkpoint = Checkpoint::load(path).unwrap();
    (checkpoint.frames, checkpoint.last.t)
}

#[test]
fn test_members_write_their_own_checkpoints() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(SchemeKind::Fbl, 2);
    config.simulation.output.write_checkpoints = true;
    config.simulation.output.checkpoint_path = Some(dir.path().join("run.jsonl"));

    let mut ensemble = build_ensemble(&config, &HostDevice).unwrap();
    ensemble.run(60.0, Some(20.0)).unwrap();
    ensemble.release().unwrap();

    assert!(!dir.path().join("run.jsonl").exists());
    for member in 0..2 {
        let path = dir.path().join(format!("run_member{member}.jsonl"));
        // Initial frame plus one per interval
        assert_eq!(frames(&path), (4, 60.0));
        assert_eq!(Checkpoint::read_header(&path).unwrap().scheme, "fbl");
    }
}

#[test]
fn test_run_without_interval_writes_start_and_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(SchemeKind::Ctcs, 1);
    config.simulation.output.write_checkpoints = true;
    config.simulation.output.checkpoint_path = Some(dir.path().join("single.jsonl"));

    let mut ensemble = build_ensemble(&config, &HostDevice).unwrap();
    ensemble.run(config.t_end, config.output_interval).unwrap();
    ensemble.release().unwrap();

    assert_eq!(frames(&dir.path().join("single_member0.jsonl")), (2, 120.0));
}
