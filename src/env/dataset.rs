//! Offline trajectory dataset and goal relabeling
//!
//! `Dataset` holds flat column arrays of transitions collected before
//! training starts; it is immutable afterwards, except for the one-time
//! speed attachment that happens during startup. `GoalDataset` wraps it
//! with the goal-relabeling sampling contract consumed by the batch
//! assembler.

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::Rng;

use super::maze::MazeEnv;
use crate::rl::batch::Batch;
use crate::rl::AgentConfig;

/// Flat column storage for offline transitions
#[derive(Debug, Clone)]
pub struct Dataset {
    observations: Vec<f32>,
    next_observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    terminals: Vec<f32>,
    speed: Option<Vec<f32>>,
    obs_dim: usize,
    action_dim: usize,
    len: usize,
}

impl Dataset {
    pub fn from_columns(
        observations: Vec<f32>,
        next_observations: Vec<f32>,
        actions: Vec<f32>,
        rewards: Vec<f32>,
        terminals: Vec<f32>,
        obs_dim: usize,
        action_dim: usize,
    ) -> Self {
        let len = rewards.len();
        debug_assert_eq!(observations.len(), len * obs_dim);
        debug_assert_eq!(next_observations.len(), len * obs_dim);
        debug_assert_eq!(actions.len(), len * action_dim);
        debug_assert_eq!(terminals.len(), len);
        Self {
            observations,
            next_observations,
            actions,
            rewards,
            terminals,
            speed: None,
            obs_dim,
            action_dim,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn observations(&self) -> &[f32] {
        &self.observations
    }

    pub fn observation(&self, i: usize) -> &[f32] {
        &self.observations[i * self.obs_dim..(i + 1) * self.obs_dim]
    }

    pub fn next_observation(&self, i: usize) -> &[f32] {
        &self.next_observations[i * self.obs_dim..(i + 1) * self.obs_dim]
    }

    pub fn action(&self, i: usize) -> &[f32] {
        &self.actions[i * self.action_dim..(i + 1) * self.action_dim]
    }

    pub fn terminal(&self, i: usize) -> f32 {
        self.terminals[i]
    }

    pub fn speed(&self) -> Option<&[f32]> {
        self.speed.as_deref()
    }

    /// Attach per-transition speed values. Done once, before training
    /// begins; the dataset is immutable afterwards.
    pub fn attach_speed(&mut self, speed: Vec<f32>) -> Result<()> {
        ensure!(
            speed.len() == self.len,
            "speed column length {} does not match dataset length {}",
            speed.len(),
            self.len
        );
        self.speed = Some(speed);
        Ok(())
    }

    /// For each transition, the index of the last transition in its
    /// trajectory (inclusive). The dataset end acts as a boundary for a
    /// trailing unterminated trajectory.
    fn trajectory_ends(&self) -> Vec<usize> {
        let mut ends = vec![0; self.len];
        let mut end = self.len.saturating_sub(1);
        for i in (0..self.len).rev() {
            if self.terminals[i] > 0.5 {
                end = i;
            }
            ends[i] = end;
        }
        ends
    }
}

/// Collect an offline dataset with a scripted noisy expert
///
/// Each episode resets to a random start/goal pair and follows the BFS
/// cell path toward the goal with uniform action noise. Episodes whose
/// goal is unreachable from the start are skipped (cannot happen on the
/// bundled layouts; kept as a guard for custom ones).
pub fn collect_dataset(env: &mut MazeEnv, episodes: usize, rng: &mut StdRng) -> Dataset {
    let obs_dim = env.observation_dim();
    let action_dim = env.action_dim();
    let mut observations = Vec::new();
    let mut next_observations = Vec::new();
    let mut actions = Vec::new();
    let mut rewards = Vec::new();
    let mut terminals = Vec::new();

    for _ in 0..episodes {
        let mut obs = env.reset(rng);
        let goal = env.goal();
        let Some(path) = env.shortest_path(env.cell_of(obs), env.cell_of(goal)) else {
            continue;
        };
        let waypoints: Vec<[f32; 2]> = path.into_iter().map(super::maze::cell_center).collect();
        let mut waypoint = 0;

        loop {
            while waypoint + 1 < waypoints.len()
                && dist2(obs, waypoints[waypoint]) < 0.3 * env.maze_unit()
            {
                waypoint += 1;
            }
            let target = if waypoint + 1 == waypoints.len() {
                goal
            } else {
                waypoints[waypoint]
            };
            let action = [
                ((target[0] - obs[0]) * 4.0 + rng.gen_range(-0.2..0.2)).clamp(-1.0, 1.0),
                ((target[1] - obs[1]) * 4.0 + rng.gen_range(-0.2..0.2)).clamp(-1.0, 1.0),
            ];

            let result = env.step(&action);
            observations.extend_from_slice(&obs);
            next_observations.extend_from_slice(&result.observation);
            actions.extend_from_slice(&action);
            rewards.push(result.reward);
            terminals.push(if result.terminated { 1.0 } else { 0.0 });
            obs = result.observation;
            if result.terminated {
                break;
            }
        }
    }

    Dataset::from_columns(
        observations,
        next_observations,
        actions,
        rewards,
        terminals,
        obs_dim,
        action_dim,
    )
}

/// Goal-relabeling view over a dataset
///
/// Sampling draws transitions uniformly with replacement. Each sampled
/// transition is paired with a goal: with probability `p_random_goal` a
/// uniformly random dataset observation, otherwise a future observation
/// from the same trajectory at a geometric offset driven by the
/// discount. Rewards and masks are recomputed against the relabeled
/// goal.
pub struct GoalDataset {
    dataset: Dataset,
    trajectory_ends: Vec<usize>,
    discount: f32,
    p_random_goal: f32,
    goal_radius: f32,
}

impl GoalDataset {
    pub fn new(dataset: Dataset, config: &AgentConfig, goal_radius: f32) -> Self {
        let trajectory_ends = dataset.trajectory_ends();
        Self {
            dataset,
            trajectory_ends,
            discount: config.discount,
            p_random_goal: config.p_random_goal,
            goal_radius,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Draw a uniformly-random relabeled batch (with replacement)
    pub fn sample(&self, batch_size: usize, rng: &mut StdRng) -> Batch {
        let ds = &self.dataset;
        let obs_dim = ds.obs_dim();
        let action_dim = ds.action_dim();
        let mut batch = Batch {
            size: batch_size,
            obs_dim,
            action_dim,
            observations: Vec::with_capacity(batch_size * obs_dim),
            next_observations: Vec::with_capacity(batch_size * obs_dim),
            actions: Vec::with_capacity(batch_size * action_dim),
            goals: Vec::with_capacity(batch_size * obs_dim),
            rewards: Vec::with_capacity(batch_size),
            masks: Vec::with_capacity(batch_size),
            speed: ds.speed().map(|_| Vec::with_capacity(batch_size)),
            obstacles: None,
            speed_obstacles: None,
        };

        for _ in 0..batch_size {
            let idx = rng.gen_range(0..ds.len());
            let goal_idx = if rng.gen::<f32>() < self.p_random_goal {
                rng.gen_range(0..ds.len())
            } else {
                self.future_index(idx, rng)
            };
            let goal = ds.observation(goal_idx);

            batch.observations.extend_from_slice(ds.observation(idx));
            batch
                .next_observations
                .extend_from_slice(ds.next_observation(idx));
            batch.actions.extend_from_slice(ds.action(idx));
            batch.goals.extend_from_slice(goal);

            let reached = dist_slice(ds.next_observation(idx), goal) <= self.goal_radius;
            batch.rewards.push(if reached { 1.0 } else { 0.0 });
            batch.masks.push(if reached { 0.0 } else { 1.0 });

            if let (Some(speeds), Some(column)) = (ds.speed(), batch.speed.as_mut()) {
                column.push(speeds[idx]);
            }
        }
        batch
    }

    /// Geometric future offset within the trajectory, capped at the
    /// trajectory end
    fn future_index(&self, idx: usize, rng: &mut StdRng) -> usize {
        let end = self.trajectory_ends[idx];
        if idx >= end {
            return end;
        }
        let u: f32 = rng.gen_range(f32::EPSILON..1.0);
        let offset = 1 + (u.ln() / self.discount.ln()) as usize;
        (idx + offset).min(end)
    }
}

fn dist2(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn dist_slice(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn collect_small() -> (Dataset, MazeEnv) {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let ds = collect_dataset(&mut env, 10, &mut rng);
        (ds, env)
    }

    #[test]
    fn test_collect_produces_transitions() {
        let (ds, _env) = collect_small();
        assert!(ds.len() > 0);
        assert_eq!(ds.obs_dim(), 2);
        assert_eq!(ds.action_dim(), 2);
        assert_eq!(ds.observations().len(), ds.len() * 2);
    }

    #[test]
    fn test_trajectories_end_with_terminal() {
        let (ds, _env) = collect_small();
        // The scripted expert always runs episodes to termination, so the
        // final transition must carry the terminal flag.
        assert_eq!(ds.terminal(ds.len() - 1), 1.0);
    }

    #[test]
    fn test_attach_speed_validates_length() {
        let (mut ds, _env) = collect_small();
        assert!(ds.attach_speed(vec![1.0; ds.len() + 1]).is_err());
        assert!(ds.attach_speed(vec![1.0; ds.len()]).is_ok());
        assert!(ds.speed().is_some());
    }

    #[test]
    fn test_sample_shapes() {
        let (ds, _env) = collect_small();
        let config = AgentConfig::default();
        let gd = GoalDataset::new(ds, &config, 0.5);
        let mut rng = StdRng::seed_from_u64(1);
        let batch = gd.sample(32, &mut rng);
        assert_eq!(batch.size, 32);
        assert_eq!(batch.observations.len(), 32 * 2);
        assert_eq!(batch.next_observations.len(), 32 * 2);
        assert_eq!(batch.actions.len(), 32 * 2);
        assert_eq!(batch.goals.len(), 32 * 2);
        assert_eq!(batch.rewards.len(), 32);
        assert_eq!(batch.masks.len(), 32);
        assert!(batch.speed.is_none());
        assert!(batch.obstacles.is_none());
    }

    #[test]
    fn test_sample_carries_speed_when_attached() {
        let (mut ds, _env) = collect_small();
        let speeds = vec![0.5; ds.len()];
        ds.attach_speed(speeds).unwrap();
        let config = AgentConfig::default();
        let gd = GoalDataset::new(ds, &config, 0.5);
        let mut rng = StdRng::seed_from_u64(1);
        let batch = gd.sample(8, &mut rng);
        let speed = batch.speed.expect("speed column missing");
        assert_eq!(speed.len(), 8);
        assert!(speed.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_rewards_and_masks_are_complementary() {
        let (ds, _env) = collect_small();
        let config = AgentConfig::default();
        let gd = GoalDataset::new(ds, &config, 0.5);
        let mut rng = StdRng::seed_from_u64(2);
        let batch = gd.sample(64, &mut rng);
        for i in 0..batch.size {
            assert_eq!(batch.rewards[i] + batch.masks[i], 1.0);
        }
    }

    #[test]
    fn test_future_goals_stay_in_trajectory() {
        let (ds, _env) = collect_small();
        let ends = ds.trajectory_ends();
        for (i, &end) in ends.iter().enumerate() {
            assert!(end >= i);
            assert!(end < ds.len());
        }
    }
}
