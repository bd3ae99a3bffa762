//! State transfer benchmark
//!
//! Times upload, download and cross-simulator copy for several grid sizes on
//! the host backend, and on the wgpu backend when built with `gpu`.
//!
//! Run with: cargo bench -p swe-simulator --bench transfer_roundtrip
//!           cargo bench --features gpu -p swe-simulator --bench transfer_roundtrip

use std::time::Instant;

use ndarray::Array2;
use swe_simulator::{CommandQueue, Device, Fbl, HostDevice, SimulationConfig, Simulator, StateSnapshot};

const GRID_SIZES: [usize; 4] = [64, 128, 256, 512];
const REPEATS: usize = 20;

struct Timings {
    upload_ms: f64,
    download_ms: f64,
    copy_ms: f64,
}

fn state(config: &SimulationConfig) -> StateSnapshot {
    let shape = config.padded_shape();
    let field = |offset: f32| Array2::from_shape_fn(shape, |(j, i)| offset + (j + i) as f32 * 1e-3);
    StateSnapshot::new(field(0.0), field(1.0), field(2.0))
}

fn benchmark<D: Device>(device: &D, n: usize) -> Timings {
    let config = SimulationConfig::new(n, n, 1000.0, 1000.0);
    let initial = state(&config);
    let mut source = Fbl::new(device, config.clone(), 50.0).expect("Failed to create simulator");
    let mut target = Fbl::new(device, config, 50.0).expect("Failed to create simulator");

    let start = Instant::now();
    for _ in 0..REPEATS {
        source
            .upload(initial.view(), None)
            .expect("Upload failed");
    }
    let upload_ms = start.elapsed().as_secs_f64() * 1000.0 / REPEATS as f64;

    let start = Instant::now();
    for _ in 0..REPEATS {
        let snapshot = source.download().expect("Download failed");
        std::hint::black_box(snapshot);
    }
    let download_ms = start.elapsed().as_secs_f64() * 1000.0 / REPEATS as f64;

    let start = Instant::now();
    for _ in 0..REPEATS {
        target.copy_state(&source).expect("Copy failed");
    }
    source.core().queue().finish().expect("Finish failed");
    let copy_ms = start.elapsed().as_secs_f64() * 1000.0 / REPEATS as f64;

    Timings {
        upload_ms,
        download_ms,
        copy_ms,
    }
}

fn report<D: Device>(device: &D) {
    println!("\n  Backend: {}", device.name());
    println!(
        "  {:>6} {:>12} {:>12} {:>12} {:>12}",
        "Grid", "Cells", "Upload ms", "Download ms", "Copy ms"
    );
    println!("  {}", "-".repeat(58));
    for &n in &GRID_SIZES {
        let t = benchmark(device, n);
        println!(
            "  {:>6} {:>12} {:>12.3} {:>12.3} {:>12.3}",
            n,
            n * n,
            t.upload_ms,
            t.download_ms,
            t.copy_ms
        );
    }
}

fn main() {
    println!("=== State Transfer Benchmark ===");
    report(&HostDevice::new());

    #[cfg(feature = "gpu")]
    match swe_simulator::WgpuDevice::new() {
        Ok(device) => report(&device),
        Err(e) => println!("\n  Skipping GPU backend: {}", e),
    }
}
