//! Kernel launch geometry.

use crate::config::TileShape;
use crate::error::{Result, SimulatorError};

/// Work-group and global launch sizes for a 2D grid.
///
/// `global_size` is the grid extent rounded up to a whole number of tiles, so
/// every cell is covered by exactly one work item. Kernels bounds-check the
/// padding region themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Tile (work-group) size `[x, y]`
    pub local_size: [u32; 2],
    /// Padded global size `[x, y]`
    pub global_size: [u32; 2],
}

impl LaunchGeometry {
    /// Compute the launch geometry for an `nx` x `ny` grid.
    pub fn new(nx: usize, ny: usize, tile: TileShape) -> Result<Self> {
        if nx == 0 || ny == 0 || tile.width == 0 || tile.height == 0 {
            return Err(SimulatorError::configuration(format!(
                "launch geometry needs positive sizes, got grid {}x{} and tile {}x{}",
                nx, ny, tile.width, tile.height
            )));
        }
        let nx = u32::try_from(nx)
            .map_err(|_| SimulatorError::configuration(format!("nx = {} too large", nx)))?;
        let ny = u32::try_from(ny)
            .map_err(|_| SimulatorError::configuration(format!("ny = {} too large", ny)))?;

        Ok(Self {
            local_size: [tile.width, tile.height],
            global_size: [padded_extent(nx, tile.width)?, padded_extent(ny, tile.height)?],
        })
    }

    /// Number of work groups `[x, y]` to dispatch.
    pub fn workgroups(&self) -> [u32; 2] {
        [
            self.global_size[0] / self.local_size[0],
            self.global_size[1] / self.local_size[1],
        ]
    }

    /// Whether the launch covers every cell of an `nx` x `ny` grid.
    pub fn covers(&self, nx: usize, ny: usize) -> bool {
        self.global_size[0] as usize >= nx && self.global_size[1] as usize >= ny
    }
}

/// `total` rounded up to whole work groups.
fn padded_extent(total: u32, workgroup_size: u32) -> Result<u32> {
    dispatch_size(total, workgroup_size)
        .checked_mul(workgroup_size)
        .ok_or_else(|| {
            SimulatorError::configuration(format!(
                "{} cells padded to tiles of {} overflow the launch size",
                total, workgroup_size
            ))
        })
}

/// Calculate dispatch workgroup count: ceil(total / workgroup_size).
fn dispatch_size(total: u32, workgroup_size: u32) -> u32 {
    total.div_ceil(workgroup_size)
}
