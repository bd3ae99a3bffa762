//! Device context abstraction.
//!
//! A [`Device`] hands out [`CommandQueue`]s; each simulator owns one queue and
//! issues every buffer operation through it, so operations against one
//! simulator complete in order. All queue operations block until the
//! transfer has finished.
//!
//! - [`host`] -- reference backend keeping buffers in host memory. Always
//!   available; used by tests and by schemes that evaluate on the host.
//! - `gpu` -- wgpu storage buffers (Metal/Vulkan/DX12). Requires the `gpu`
//!   feature.

pub mod host;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use host::{HostBuffer, HostDevice, HostQueue};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, WgpuBuffer, WgpuDevice, WgpuQueue};

use crate::error::DeviceError;

/// A device context able to create command queues.
pub trait Device: Send + Sync + 'static {
    /// Queue type handed to simulators.
    type Queue: CommandQueue;

    /// Human-readable device name, for logs.
    fn name(&self) -> String;

    /// Create a new command queue on this device.
    fn create_queue(&self) -> Result<Self::Queue, DeviceError>;
}

/// A device-resident `f32` buffer.
pub trait DeviceBuffer: Send + Sync {
    /// Number of `f32` elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Debug label given at allocation.
    fn label(&self) -> &str;
}

/// An in-order command queue on a [`Device`].
///
/// Cloning a queue yields another handle to the same queue, which is how
/// drifter trackers borrow a simulator's queue.
pub trait CommandQueue: Clone + Send + Sync + 'static {
    /// Buffer type allocated by this queue.
    type Buffer: DeviceBuffer;

    /// Allocate a zero-initialized buffer of `len` elements.
    fn allocate(&self, label: &str, len: usize) -> Result<Self::Buffer, DeviceError>;

    /// Overwrite `buffer` with `data`. `data.len()` must equal `buffer.len()`.
    fn write(&self, buffer: &Self::Buffer, data: &[f32]) -> Result<(), DeviceError>;

    /// Read the full contents of `buffer`.
    fn read(&self, buffer: &Self::Buffer) -> Result<Vec<f32>, DeviceError>;

    /// Copy all of `src` into `dst`. Lengths must match.
    ///
    /// `src` may belong to another queue of the same device context.
    fn copy(&self, src: &Self::Buffer, dst: &Self::Buffer) -> Result<(), DeviceError>;

    /// Wait for all submitted work to complete.
    fn finish(&self) -> Result<(), DeviceError>;
}

/// Check that host data matches a buffer's length.
pub(crate) fn check_len(expected: usize, actual: usize) -> Result<(), DeviceError> {
    if expected != actual {
        return Err(DeviceError::SizeMismatch { expected, actual });
    }
    Ok(())
}
