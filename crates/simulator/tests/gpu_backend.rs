//! wgpu backend parity with the host backend.
//!
//! Gated behind `#[cfg(feature = "gpu")]`; each test returns early when no
//! adapter is available.

#![cfg(feature = "gpu")]

use ndarray::Array2;
use swe_simulator::{
    gpu_available, CommandQueue, Device, DeviceError, Fbl, HostDevice, SimulationConfig, Simulator,
    StateSnapshot, WgpuDevice,
};

fn device() -> Option<WgpuDevice> {
    if !gpu_available() {
        eprintln!("Skipping: no GPU adapter");
        return None;
    }
    WgpuDevice::new().ok()
}

fn bump(config: &SimulationConfig) -> StateSnapshot {
    let (ny, nx) = config.padded_shape();
    let eta = Array2::from_shape_fn((ny, nx), |(j, i)| {
        let r2 = (i as f32 - nx as f32 / 2.0).powi(2) + (j as f32 - ny as f32 / 2.0).powi(2);
        (-r2 / 6.0).exp()
    });
    StateSnapshot::new(eta, Array2::zeros((ny, nx)), Array2::zeros((ny, nx)))
}

#[test]
fn test_buffer_round_trip() {
    let Some(device) = device() else { return };
    let queue = device.create_queue().unwrap();
    let data: Vec<f32> = (0..1000).map(|i| i as f32 * 0.5).collect();

    let buffer = queue.allocate("eta0", data.len()).unwrap();
    assert_eq!(queue.read(&buffer).unwrap(), vec![0.0; 1000]);
    queue.write(&buffer, &data).unwrap();
    assert_eq!(queue.read(&buffer).unwrap(), data);

    let copy = queue.allocate("eta1", data.len()).unwrap();
    queue.copy(&buffer, &copy).unwrap();
    assert_eq!(queue.read(&copy).unwrap(), data);
}

#[test]
fn test_foreign_buffer_rejected() {
    let Some(first) = device() else { return };
    let Ok(second) = WgpuDevice::new() else { return };
    let q1 = first.create_queue().unwrap();
    let q2 = second.create_queue().unwrap();

    let src = q1.allocate("src", 4).unwrap();
    let dst = q2.allocate("dst", 4).unwrap();
    assert!(matches!(
        q2.copy(&src, &dst),
        Err(DeviceError::ForeignBuffer(_))
    ));
}

#[test]
fn test_fbl_matches_host_backend() {
    let Some(device) = device() else { return };
    let config = SimulationConfig::new(32, 24, 1000.0, 1000.0);
    let initial = bump(&config);

    let mut gpu = Fbl::new(&device, config.clone(), 20.0).unwrap();
    let mut host = Fbl::new(&HostDevice, config, 20.0).unwrap();
    gpu.upload(initial.view(), None).unwrap();
    host.upload(initial.view(), None).unwrap();
    gpu.step(300.0).unwrap();
    host.step(300.0).unwrap();

    // Same host-side arithmetic, so the backends agree exactly
    assert_eq!(gpu.download().unwrap(), host.download().unwrap());
    assert_eq!(
        gpu.download_prev_timestep().unwrap(),
        host.download_prev_timestep().unwrap()
    );
}

#[test]
fn test_copy_state_on_device() {
    let Some(device) = device() else { return };
    let config = SimulationConfig::new(16, 16, 1000.0, 1000.0);
    let mut source = Fbl::new(&device, config.clone(), 20.0).unwrap();
    let mut target = Fbl::new(&device, config.clone(), 20.0).unwrap();
    source.upload(bump(&config).view(), None).unwrap();
    source.step(100.0).unwrap();

    target.copy_state(&source).unwrap();

    assert_eq!(target.download().unwrap(), source.download().unwrap());
    assert_eq!(
        target.download_prev_timestep().unwrap(),
        source.download_prev_timestep().unwrap()
    );
}
