//! wgpu backend: grid fields live in GPU storage buffers.
//!
//! One wgpu device/queue pair is shared by every [`WgpuQueue`] created from a
//! [`WgpuDevice`]; clones of the device share it too, which is what lets
//! `copy_state` move buffers between simulators without a host round-trip.
//! Every operation submits and then waits with `poll(Maintain::Wait)`.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::{check_len, CommandQueue, Device, DeviceBuffer};
use crate::error::DeviceError;

/// Minimum buffer size (wgpu requires non-zero buffers).
const MIN_BUF_SIZE: u64 = 4;

const F32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// Check whether a GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// A wgpu device context.
#[derive(Clone)]
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
}

impl WgpuDevice {
    /// Create a device on the highest-performance adapter.
    ///
    /// Returns `Err(DeviceError::Init)` if no suitable adapter is found,
    /// allowing callers to fall back to the host backend.
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::Init("No suitable GPU adapter found".into()))?;

        let adapter_name = adapter.get_info().name;
        tracing::info!("GPU adapter: {:?}", adapter_name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("swe_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| DeviceError::Init(format!("Failed to create device: {e}")))?;

        Ok(Self::from_parts(device, queue, adapter_name))
    }

    /// Wrap an existing wgpu device and queue, e.g. one shared with a renderer.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, adapter_name: String) -> Self {
        Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
        }
    }

    /// Underlying wgpu device, for schemes that build compute pipelines.
    pub fn raw_device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl Device for WgpuDevice {
    type Queue = WgpuQueue;

    fn name(&self) -> String {
        self.adapter_name.clone()
    }

    fn create_queue(&self) -> Result<WgpuQueue, DeviceError> {
        Ok(WgpuQueue {
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
        })
    }
}

/// Command queue handle on a [`WgpuDevice`].
#[derive(Clone)]
pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuQueue {
    /// Underlying wgpu device.
    pub fn raw_device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Underlying wgpu queue.
    pub fn raw_queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn owner_id(&self) -> usize {
        Arc::as_ptr(&self.device) as usize
    }

    fn check_owner(&self, buffer: &WgpuBuffer) -> Result<(), DeviceError> {
        if buffer.owner != self.owner_id() {
            return Err(DeviceError::ForeignBuffer(buffer.label.clone()));
        }
        Ok(())
    }
}

/// GPU storage buffer of `f32` values.
pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    label: String,
    len: usize,
    owner: usize,
}

impl WgpuBuffer {
    /// Underlying wgpu buffer, for binding in compute passes.
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    fn byte_len(&self) -> u64 {
        self.len as u64 * F32_SIZE
    }
}

impl DeviceBuffer for WgpuBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl CommandQueue for WgpuQueue {
    type Buffer = WgpuBuffer;

    fn allocate(&self, label: &str, len: usize) -> Result<WgpuBuffer, DeviceError> {
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let buffer = if len == 0 {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: MIN_BUF_SIZE,
                usage,
                mapped_at_creation: false,
            })
        } else {
            let zeros = vec![0.0f32; len];
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(&zeros),
                    usage,
                })
        };
        Ok(WgpuBuffer {
            buffer,
            label: label.to_string(),
            len,
            owner: self.owner_id(),
        })
    }

    fn write(&self, buffer: &WgpuBuffer, data: &[f32]) -> Result<(), DeviceError> {
        self.check_owner(buffer)?;
        check_len(buffer.len, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(data));
        self.queue.submit(std::iter::empty());
        self.finish()
    }

    fn read(&self, buffer: &WgpuBuffer) -> Result<Vec<f32>, DeviceError> {
        self.check_owner(buffer)?;
        if buffer.len == 0 {
            return Ok(Vec::new());
        }
        let byte_size = buffer.byte_len();

        // Create a staging buffer for readback
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_readback"),
            size: byte_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, byte_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Map and read
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| DeviceError::Readback(format!("channel closed: {}", e)))?
            .map_err(|e| DeviceError::Readback(format!("buffer mapping failed: {}", e)))?;

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data)[..buffer.len].to_vec();
        drop(data);
        staging.unmap();

        Ok(result)
    }

    fn copy(&self, src: &WgpuBuffer, dst: &WgpuBuffer) -> Result<(), DeviceError> {
        self.check_owner(src)?;
        self.check_owner(dst)?;
        check_len(dst.len, src.len)?;
        if std::ptr::eq(src, dst) || src.len == 0 {
            return Ok(());
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_state"),
            });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, src.byte_len());
        self.queue.submit(std::iter::once(encoder.finish()));
        self.finish()
    }

    fn finish(&self) -> Result<(), DeviceError> {
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
