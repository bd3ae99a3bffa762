//! Double-buffered grid state store.
//!
//! Two generations of the three state fields (surface elevation `eta` and the
//! momenta `hu`, `hv`), each a `(ny + 2 * ghost_y) x (nx + 2 * ghost_x)`
//! buffer on the device. Generation zero holds the state at the simulator's
//! current time; what generation one holds is up to the scheme.

use ndarray::{s, Array2, ArrayView2};

use crate::config::SimulationConfig;
use crate::device::{CommandQueue, DeviceBuffer};
use crate::error::{Result, SimulatorError};

/// The three state fields of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTriple<T> {
    /// Surface elevation
    pub eta: T,
    /// Momentum in x
    pub hu: T,
    /// Momentum in y
    pub hv: T,
}

impl<T> FieldTriple<T> {
    /// Build a triple from its three fields.
    pub fn new(eta: T, hu: T, hv: T) -> Self {
        Self { eta, hu, hv }
    }

    /// Fields paired with their names, in `eta, hu, hv` order.
    pub fn named(&self) -> [(&'static str, &T); 3] {
        [("eta", &self.eta), ("hu", &self.hu), ("hv", &self.hv)]
    }
}

/// Host-side copy of one generation.
pub type StateSnapshot = FieldTriple<Array2<f32>>;

/// Borrowed host fields, as accepted by uploads.
pub type FieldViews<'a> = FieldTriple<ArrayView2<'a, f32>>;

impl StateSnapshot {
    /// All-zero state of the given `(ny, nx)` shape.
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self::new(
            Array2::zeros(shape),
            Array2::zeros(shape),
            Array2::zeros(shape),
        )
    }

    /// Borrow the snapshot for upload.
    pub fn view(&self) -> FieldViews<'_> {
        FieldTriple::new(self.eta.view(), self.hu.view(), self.hv.view())
    }

    /// `(ny, nx)` of the fields.
    pub fn shape(&self) -> (usize, usize) {
        self.eta.dim()
    }

    /// Interior cells only, dropping `gx` columns and `gy` rows on each side.
    pub fn interior(&self, gx: usize, gy: usize) -> Self {
        let strip = |field: &Array2<f32>| {
            let (ny, nx) = field.dim();
            field.slice(s![gy..ny - gy, gx..nx - gx]).to_owned()
        };
        Self::new(strip(&self.eta), strip(&self.hu), strip(&self.hv))
    }

    /// Embed interior fields into a zero-padded grid with the given margins.
    pub fn padded(&self, gx: usize, gy: usize) -> Self {
        let pad = |field: &Array2<f32>| {
            let (ny, nx) = field.dim();
            let mut out = Array2::zeros((ny + 2 * gy, nx + 2 * gx));
            out.slice_mut(s![gy..gy + ny, gx..gx + nx]).assign(field);
            out
        };
        Self::new(pad(&self.eta), pad(&self.hu), pad(&self.hv))
    }

    /// Whether every value is finite.
    pub fn is_finite(&self) -> bool {
        self.named()
            .iter()
            .all(|(_, field)| field.iter().all(|v| v.is_finite()))
    }
}

/// Selects one of the two stored generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// The state at the simulator's current time
    Zero,
    /// Previous state or working buffer, by scheme convention
    One,
}

impl Generation {
    fn index(self) -> usize {
        match self {
            Generation::Zero => 0,
            Generation::One => 1,
        }
    }
}

/// Padded `(ny, nx)` shape shared by all six fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShape {
    /// Rows, including ghost cells
    pub ny: usize,
    /// Columns, including ghost cells
    pub nx: usize,
}

impl FieldShape {
    /// Padded shape for a configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let (ny, nx) = config.padded_shape();
        Self { ny, nx }
    }

    /// Number of elements per field.
    pub fn len(&self) -> usize {
        self.ny * self.nx
    }

    /// Whether a field holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(ny, nx)` tuple.
    pub fn dims(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }
}

/// Two device-resident generations of the state fields.
pub struct GridState<B> {
    shape: FieldShape,
    generations: [FieldTriple<B>; 2],
}

impl<B: DeviceBuffer> GridState<B> {
    /// Allocate both generations, zero-initialized.
    pub fn allocate<Q>(queue: &Q, shape: FieldShape) -> Result<Self>
    where
        Q: CommandQueue<Buffer = B>,
    {
        let len = shape.len();
        let allocate_generation = |suffix: char| -> Result<FieldTriple<B>> {
            Ok(FieldTriple::new(
                queue.allocate(&format!("eta{}", suffix), len)?,
                queue.allocate(&format!("hu{}", suffix), len)?,
                queue.allocate(&format!("hv{}", suffix), len)?,
            ))
        };
        Ok(Self {
            shape,
            generations: [allocate_generation('0')?, allocate_generation('1')?],
        })
    }

    /// Padded field shape.
    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    /// Buffers of one generation, for device-native kernels.
    pub fn generation(&self, generation: Generation) -> &FieldTriple<B> {
        &self.generations[generation.index()]
    }

    /// Exchange the two generations without moving any data.
    pub fn swap(&mut self) {
        self.generations.swap(0, 1);
    }

    /// Read one generation back to the host.
    pub fn download<Q>(&self, queue: &Q, generation: Generation) -> Result<StateSnapshot>
    where
        Q: CommandQueue<Buffer = B>,
    {
        let fields = self.generation(generation);
        let dims = self.shape.dims();
        Ok(FieldTriple::new(
            Array2::from_shape_vec(dims, queue.read(&fields.eta)?)?,
            Array2::from_shape_vec(dims, queue.read(&fields.hu)?)?,
            Array2::from_shape_vec(dims, queue.read(&fields.hv)?)?,
        ))
    }

    /// Check that host fields match the field shape.
    pub fn check_shapes(&self, fields: &FieldViews<'_>, label: &str) -> Result<()> {
        for (name, field) in fields.named() {
            if field.dim() != self.shape.dims() {
                return Err(SimulatorError::shape_mismatch(
                    format!("{} field `{}` has the wrong shape", label, name),
                    self.shape.dims(),
                    field.dim(),
                ));
            }
        }
        Ok(())
    }

    /// Write host fields into one generation.
    pub fn write<Q>(&self, queue: &Q, generation: Generation, fields: &FieldViews<'_>) -> Result<()>
    where
        Q: CommandQueue<Buffer = B>,
    {
        self.check_shapes(fields, "uploaded")?;
        let target = self.generation(generation);
        for ((_, buffer), (_, field)) in target.named().into_iter().zip(fields.named()) {
            let data: Vec<f32> = field.iter().copied().collect();
            queue.write(buffer, &data)?;
        }
        Ok(())
    }

    /// Device-to-device copy of both generations from `other`.
    pub fn copy_from<Q>(&self, queue: &Q, other: &GridState<B>) -> Result<()>
    where
        Q: CommandQueue<Buffer = B>,
    {
        if self.shape != other.shape {
            return Err(SimulatorError::shape_mismatch(
                "padded field shapes differ",
                self.shape.dims(),
                other.shape.dims(),
            ));
        }
        for (dst, src) in self.generations.iter().zip(other.generations.iter()) {
            queue.copy(&src.eta, &dst.eta)?;
            queue.copy(&src.hu, &dst.hu)?;
            queue.copy(&src.hv, &dst.hv)?;
        }
        Ok(())
    }
}
