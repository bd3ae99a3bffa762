//! Drifter (passive particle) attachment.
//!
//! Trackers are owned by the caller and shared as [`SharedDrifters`]. A
//! simulator keeps only a weak handle, so dropping the tracker detaches it.

use std::sync::{Arc, Mutex};

/// Positions are `[x, y]` in metres from the domain origin.
pub type Position = [f32; 2];

/// Particle tracker collaborator.
pub trait DrifterTracker<Q>: Send {
    /// Borrow the simulator's command queue for device work.
    fn set_queue(&mut self, queue: Q);

    /// Current particle positions.
    fn particle_positions(&self) -> Vec<Position>;

    /// Overwrite the particle positions.
    fn set_particle_positions(&mut self, positions: &[Position]);

    /// Current observation point.
    fn observation_position(&self) -> Position;

    /// Move the observation point.
    fn set_observation_position(&mut self, position: Position);
}

/// Caller-owned tracker handle.
pub type SharedDrifters<Q> = Arc<Mutex<dyn DrifterTracker<Q>>>;

/// Host copy of a tracker's positions.
#[derive(Debug, Clone, PartialEq)]
pub struct DrifterState {
    /// Particle positions
    pub particles: Vec<Position>,
    /// Observation point
    pub observation: Position,
}

/// Host-side drifter set with no advection of its own.
#[derive(Debug, Clone)]
pub struct DrifterSet<Q> {
    positions: Vec<Position>,
    observation: Position,
    queue: Option<Q>,
}

impl<Q> DrifterSet<Q> {
    /// Create a set of drifters at `positions`, observed at the origin.
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            positions,
            observation: [0.0, 0.0],
            queue: None,
        }
    }

    /// Set the observation point.
    pub fn with_observation(mut self, observation: Position) -> Self {
        self.observation = observation;
        self
    }

    /// Number of drifters.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the set has no drifters.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Queue borrowed from the attached simulator, if any.
    pub fn queue(&self) -> Option<&Q> {
        self.queue.as_ref()
    }

    /// Wrap in a shared handle for attachment.
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }
}

impl<Q: Send> DrifterTracker<Q> for DrifterSet<Q> {
    fn set_queue(&mut self, queue: Q) {
        self.queue = Some(queue);
    }

    fn particle_positions(&self) -> Vec<Position> {
        self.positions.clone()
    }

    fn set_particle_positions(&mut self, positions: &[Position]) {
        self.positions = positions.to_vec();
    }

    fn observation_position(&self) -> Position {
        self.observation
    }

    fn set_observation_position(&mut self, position: Position) {
        self.observation = position;
    }
}
