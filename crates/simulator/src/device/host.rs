//! Host-memory reference backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{check_len, CommandQueue, Device, DeviceBuffer};
use crate::error::DeviceError;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

/// Device context whose buffers live in host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDevice;

impl HostDevice {
    /// Create a host device.
    pub fn new() -> Self {
        Self
    }
}

impl Device for HostDevice {
    type Queue = HostQueue;

    fn name(&self) -> String {
        "host".to_string()
    }

    fn create_queue(&self) -> Result<HostQueue, DeviceError> {
        Ok(HostQueue {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
        })
    }
}

/// Command queue of a [`HostDevice`]. Operations execute immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostQueue {
    id: u64,
}

impl HostQueue {
    /// Unique queue id, shared by clones of the same queue.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Host-memory buffer.
#[derive(Debug)]
pub struct HostBuffer {
    label: String,
    data: RwLock<Vec<f32>>,
}

impl DeviceBuffer for HostBuffer {
    fn len(&self) -> usize {
        match self.data.read() {
            Ok(data) => data.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl CommandQueue for HostQueue {
    type Buffer = HostBuffer;

    fn allocate(&self, label: &str, len: usize) -> Result<HostBuffer, DeviceError> {
        Ok(HostBuffer {
            label: label.to_string(),
            data: RwLock::new(vec![0.0; len]),
        })
    }

    fn write(&self, buffer: &HostBuffer, data: &[f32]) -> Result<(), DeviceError> {
        let mut dst = buffer
            .data
            .write()
            .map_err(|_| DeviceError::Poisoned(buffer.label.clone()))?;
        check_len(dst.len(), data.len())?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: &HostBuffer) -> Result<Vec<f32>, DeviceError> {
        let data = buffer
            .data
            .read()
            .map_err(|_| DeviceError::Poisoned(buffer.label.clone()))?;
        Ok(data.clone())
    }

    fn copy(&self, src: &HostBuffer, dst: &HostBuffer) -> Result<(), DeviceError> {
        if std::ptr::eq(src, dst) {
            return Ok(());
        }
        let source = src
            .data
            .read()
            .map_err(|_| DeviceError::Poisoned(src.label.clone()))?;
        let mut target = dst
            .data
            .write()
            .map_err(|_| DeviceError::Poisoned(dst.label.clone()))?;
        check_len(target.len(), source.len())?;
        target.copy_from_slice(&source);
        Ok(())
    }

    fn finish(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
