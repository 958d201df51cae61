//! Minibatch assembly with optional obstacle augmentation

use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Once;
use tracing::warn;

use crate::env::{GoalDataset, ObstacleSet};

/// One training minibatch, flat row-major columns
///
/// Base fields are always present; `speed` follows the dataset, and the
/// obstacle fields are attached conditionally by the assembler. A batch
/// lives for exactly one update call.
#[derive(Debug, Clone)]
pub struct Batch {
    pub size: usize,
    pub obs_dim: usize,
    pub action_dim: usize,
    pub observations: Vec<f32>,
    pub next_observations: Vec<f32>,
    pub actions: Vec<f32>,
    pub goals: Vec<f32>,
    pub rewards: Vec<f32>,
    pub masks: Vec<f32>,
    pub speed: Option<Vec<f32>>,
    pub obstacles: Option<Vec<f32>>,
    pub speed_obstacles: Option<Vec<f32>>,
}

impl Batch {
    pub fn has_obstacles(&self) -> bool {
        self.obstacles.is_some()
    }
}

static DIMENSION_MISMATCH_WARNING: Once = Once::new();

/// Draws batches from a dataset and conditionally augments them with
/// sampled obstacle coordinates
///
/// Augmentation requires obstacle conditioning to be enabled AND the
/// obstacle coordinate dimensionality to match the observation
/// dimensionality. A mismatch skips augmentation (the batch is returned
/// unmodified) and logs a single warning for the whole run; it is not a
/// hard failure so heterogeneous environments keep working.
pub struct BatchAssembler<'a> {
    pub dataset: &'a GoalDataset,
    pub obstacles: Option<&'a ObstacleSet>,
    pub use_obstacles: bool,
    pub batch_size: usize,
    pub batch_size_obstacles: usize,
    pub speed_min: f32,
}

impl BatchAssembler<'_> {
    pub fn assemble(&self, rng: &mut StdRng) -> Batch {
        let mut batch = self.dataset.sample(self.batch_size, rng);
        if !self.use_obstacles {
            return batch;
        }
        let Some(set) = self.obstacles else {
            return batch;
        };

        if set.dim() != batch.obs_dim {
            DIMENSION_MISMATCH_WARNING.call_once(|| {
                warn!(
                    obstacle_dim = set.dim(),
                    observation_dim = batch.obs_dim,
                    "obstacle coordinate dimensionality does not match observations; \
                     skipping obstacle augmentation for this run"
                );
            });
            return batch;
        }

        let mut coordinates = Vec::with_capacity(self.batch_size_obstacles * set.dim());
        for _ in 0..self.batch_size_obstacles {
            let idx = rng.gen_range(0..set.len());
            coordinates.extend_from_slice(set.coordinate(idx));
        }
        batch.obstacles = Some(coordinates);
        batch.speed_obstacles = Some(vec![self.speed_min; self.batch_size_obstacles]);
        batch
    }
}
