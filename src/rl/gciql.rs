//! Goal-conditioned IQL-style agent
//!
//! Trains a value function `V(s, g)` by expectile regression toward the
//! one-step bootstrapped target, and an actor by advantage-weighted
//! regression (or plain BC). When a batch carries obstacle coordinates,
//! the value at those coordinates is regressed toward the minimum speed,
//! pinning the learned landscape down around walls.
//!
//! The bootstrap target and the advantage weights are computed from a
//! no-grad forward pass; only the regression terms carry gradients.

use burn::{
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, Distribution, ElementConversion, Tensor},
};

use super::agent::{mean, policy_inputs, tensor1, tensor2, UpdateInfo};
use super::batch::Batch;
use super::config::{ActorLoss, AgentConfig};
use super::network::{
    PolicyConfig, PolicyNetwork, PolicyNetworkRecord, ValueConfig, ValueNetwork,
    ValueNetworkRecord,
};

const AWR_WEIGHT_CAP: f32 = 100.0;

/// IQL-style goal-conditioned agent with a learned value function
pub struct GciqlAgent<B: AutodiffBackend> {
    policy: PolicyNetwork<B>,
    value: ValueNetwork<B>,
    policy_optim: OptimizerAdaptor<Adam<B::InnerBackend>, PolicyNetwork<B>, B>,
    value_optim: OptimizerAdaptor<Adam<B::InnerBackend>, ValueNetwork<B>, B>,
    config: AgentConfig,
    obs_dim: usize,
    action_dim: usize,
    conditioned: bool,
    device: B::Device,
}

/// Scalar pieces shared between `update` and `loss`
struct LossTerms {
    targets: Vec<f32>,
    diffs: Vec<f32>,
    value_weights: Vec<f32>,
    actor_weights: Vec<f32>,
    v_mean: f32,
}

impl<B: AutodiffBackend> GciqlAgent<B> {
    pub fn create(example: &Batch, config: AgentConfig, device: &B::Device) -> Self {
        let conditioned = config.speed_profile.is_some();
        let policy_input_dim = example.obs_dim * 2 + usize::from(conditioned);
        let policy =
            PolicyConfig::new(policy_input_dim, example.action_dim, config.hidden_dim).init(device);
        let value = ValueConfig::new(example.obs_dim * 2, config.hidden_dim).init(device);
        Self {
            policy,
            value,
            policy_optim: AdamConfig::new().init(),
            value_optim: AdamConfig::new().init(),
            config,
            obs_dim: example.obs_dim,
            action_dim: example.action_dim,
            conditioned,
            device: device.clone(),
        }
    }

    /// No-grad forward passes: targets, expectile weights, and AWR
    /// weights for this batch
    fn loss_terms(&self, batch: &Batch) -> LossTerms {
        let value = self.value.valid();

        let cur = self.value_input_rows(&batch.observations, &batch.goals);
        let next = self.value_input_rows(&batch.next_observations, &batch.goals);
        let v_now = forward_values::<B>(&value, &cur, batch.size, self.obs_dim * 2, &self.device);
        let v_next = forward_values::<B>(&value, &next, batch.size, self.obs_dim * 2, &self.device);

        let discount = self.config.discount;
        let targets: Vec<f32> = (0..batch.size)
            .map(|i| batch.rewards[i] + discount * batch.masks[i] * v_next[i])
            .collect();
        let diffs: Vec<f32> = (0..batch.size).map(|i| targets[i] - v_now[i]).collect();

        let tau = self.config.expectile;
        let value_weights: Vec<f32> = diffs
            .iter()
            .map(|&d| if d > 0.0 { tau } else { 1.0 - tau })
            .collect();

        let actor_weights: Vec<f32> = match self.config.resolved_actor_loss() {
            ActorLoss::Awr => diffs
                .iter()
                .map(|&adv| (self.config.awr_temperature * adv).exp().min(AWR_WEIGHT_CAP))
                .collect(),
            ActorLoss::Bc => vec![1.0; batch.size],
        };

        LossTerms {
            targets,
            diffs,
            value_weights,
            actor_weights,
            v_mean: mean(&v_now),
        }
    }

    /// One value + actor gradient step
    pub fn update(mut self, batch: &Batch) -> (Self, UpdateInfo) {
        let terms = self.loss_terms(batch);
        let mut info = UpdateInfo::new();

        // Value step: expectile regression, plus the obstacle pin when
        // the batch carries obstacle coordinates.
        let cur = self.value_input_rows(&batch.observations, &batch.goals);
        let x_value = tensor2::<B>(&cur, batch.size, self.obs_dim * 2, &self.device);
        let v_pred = self.value.forward(x_value).squeeze::<1>(1);
        let diff = tensor1::<B>(&terms.targets, &self.device) - v_pred;
        let weights = tensor1::<B>(&terms.value_weights, &self.device);
        let value_loss = (weights * diff.clone() * diff).mean();
        info.insert(
            "value_loss".to_string(),
            value_loss.clone().into_scalar().elem::<f32>(),
        );

        let mut value_total = value_loss;
        if let (Some(obstacles), Some(speed_obstacles)) =
            (&batch.obstacles, &batch.speed_obstacles)
        {
            let rows = self.value_input_rows(obstacles, &batch.goals);
            let count = speed_obstacles.len();
            let x_obstacle = tensor2::<B>(&rows, count, self.obs_dim * 2, &self.device);
            let v_obstacle = self.value.forward(x_obstacle).squeeze::<1>(1);
            let odiff = tensor1::<B>(speed_obstacles, &self.device) - v_obstacle;
            let obstacle_loss = (odiff.clone() * odiff).mean();
            info.insert(
                "obstacle_loss".to_string(),
                obstacle_loss.clone().into_scalar().elem::<f32>(),
            );
            value_total = value_total + obstacle_loss;
        }

        let grads = value_total.backward();
        let grads = GradientsParams::from_grads(grads, &self.value);
        self.value = self
            .value_optim
            .step(self.config.learning_rate, self.value.clone(), grads);

        // Actor step: (advantage-)weighted regression onto the batch
        // actions.
        let (inputs, input_dim) = policy_inputs(batch, self.conditioned);
        let x_policy = tensor2::<B>(&inputs, batch.size, input_dim, &self.device);
        let target = tensor2::<B>(&batch.actions, batch.size, batch.action_dim, &self.device);
        let err = self.policy.forward(x_policy) - target;
        let per_row = (err.clone() * err).sum_dim(1).squeeze::<1>(1);
        let actor_loss = (per_row * tensor1::<B>(&terms.actor_weights, &self.device)).mean();
        info.insert(
            "actor_loss".to_string(),
            actor_loss.clone().into_scalar().elem::<f32>(),
        );

        let grads = actor_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.policy);
        self.policy = self
            .policy_optim
            .step(self.config.learning_rate, self.policy.clone(), grads);

        info.insert("v_mean".to_string(), terms.v_mean);
        info.insert("adv_mean".to_string(), mean(&terms.diffs));
        (self, info)
    }

    /// Loss diagnostics on a validation batch; no parameters change
    pub fn loss(&self, batch: &Batch) -> UpdateInfo {
        let terms = self.loss_terms(batch);
        let mut info = UpdateInfo::new();

        let value_loss = mean(
            &(0..batch.size)
                .map(|i| terms.value_weights[i] * terms.diffs[i] * terms.diffs[i])
                .collect::<Vec<_>>(),
        );
        info.insert("value_loss".to_string(), value_loss);

        if let (Some(obstacles), Some(speed_obstacles)) =
            (&batch.obstacles, &batch.speed_obstacles)
        {
            let value = self.value.valid();
            let rows = self.value_input_rows(obstacles, &batch.goals);
            let count = speed_obstacles.len();
            let v_obstacle =
                forward_values::<B>(&value, &rows, count, self.obs_dim * 2, &self.device);
            let obstacle_loss = mean(
                &(0..count)
                    .map(|i| {
                        let d = speed_obstacles[i] - v_obstacle[i];
                        d * d
                    })
                    .collect::<Vec<_>>(),
            );
            info.insert("obstacle_loss".to_string(), obstacle_loss);
        }

        let (inputs, input_dim) = policy_inputs(batch, self.conditioned);
        let policy = self.policy.valid();
        let x = tensor2::<B::InnerBackend>(&inputs, batch.size, input_dim, &self.device);
        let target =
            tensor2::<B::InnerBackend>(&batch.actions, batch.size, batch.action_dim, &self.device);
        let err = policy.forward(x) - target;
        let per_row: Vec<f32> = (err.clone() * err)
            .sum_dim(1)
            .into_data()
            .to_vec()
            .expect("loss tensor should convert to vec");
        let actor_loss = mean(
            &per_row
                .iter()
                .zip(&terms.actor_weights)
                .map(|(e, w)| e * w)
                .collect::<Vec<_>>(),
        );
        info.insert("actor_loss".to_string(), actor_loss);

        info.insert("v_mean".to_string(), terms.v_mean);
        info.insert("adv_mean".to_string(), mean(&terms.diffs));
        info
    }

    pub fn sample_actions(
        &self,
        observation: &[f32],
        goal: &[f32],
        speed: Option<f32>,
        temperature: f32,
        gaussian: Option<f32>,
    ) -> Vec<f32> {
        let mut input = Vec::with_capacity(observation.len() + goal.len() + 1);
        input.extend_from_slice(observation);
        input.extend_from_slice(goal);
        if self.conditioned {
            input.push(speed.unwrap_or(1.0));
        }

        let policy = self.policy.valid();
        let x = tensor2::<B::InnerBackend>(&input, 1, input.len(), &self.device);
        let mut action = policy.forward(x);
        if temperature > 0.0 {
            action = action
                + Tensor::random(
                    [1, self.action_dim],
                    Distribution::Normal(0.0, temperature as f64),
                    &self.device,
                );
        }
        if let Some(std) = gaussian {
            action = action
                + Tensor::random(
                    [1, self.action_dim],
                    Distribution::Normal(0.0, std as f64),
                    &self.device,
                );
        }
        action
            .clamp(-1.0, 1.0)
            .into_data()
            .to_vec()
            .expect("action tensor should convert to vec")
    }

    /// Value estimates for a flat array of points against a fixed goal
    pub fn value(&self, points: &[f32], goal: &[f32]) -> Vec<f32> {
        let n = points.len() / self.obs_dim;
        let mut rows = Vec::with_capacity(n * self.obs_dim * 2);
        for i in 0..n {
            rows.extend_from_slice(&points[i * self.obs_dim..(i + 1) * self.obs_dim]);
            rows.extend_from_slice(goal);
        }
        let value = self.value.valid();
        forward_values::<B>(&value, &rows, n, self.obs_dim * 2, &self.device)
    }

    pub fn fork(&self, device: &B::Device) -> Self {
        Self {
            policy: self.policy.clone().fork(device),
            value: self.value.clone().fork(device),
            policy_optim: AdamConfig::new().init(),
            value_optim: AdamConfig::new().init(),
            config: self.config.clone(),
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
            conditioned: self.conditioned,
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// `[row ‖ goal]` inputs, cycling goals when there are more rows
    /// than goals (obstacle coordinates reuse batch goals)
    fn value_input_rows(&self, rows: &[f32], goals: &[f32]) -> Vec<f32> {
        let dim = self.obs_dim;
        let n = rows.len() / dim;
        let goal_count = goals.len() / dim;
        let mut inputs = Vec::with_capacity(n * dim * 2);
        for i in 0..n {
            inputs.extend_from_slice(&rows[i * dim..(i + 1) * dim]);
            let g = i % goal_count.max(1);
            inputs.extend_from_slice(&goals[g * dim..(g + 1) * dim]);
        }
        inputs
    }

    pub(crate) fn policy(&self) -> &PolicyNetwork<B> {
        &self.policy
    }

    pub(crate) fn value_network(&self) -> &ValueNetwork<B> {
        &self.value
    }

    pub(crate) fn load_policy(mut self, record: PolicyNetworkRecord<B>) -> Self {
        self.policy = self.policy.load_record(record);
        self
    }

    pub(crate) fn load_value(mut self, record: ValueNetworkRecord<B>) -> Self {
        self.value = self.value.load_record(record);
        self
    }
}

/// Forward a no-grad value network over flat rows and pull the scalars
/// back out
fn forward_values<B: AutodiffBackend>(
    value: &ValueNetwork<B::InnerBackend>,
    rows: &[f32],
    n: usize,
    input_dim: usize,
    device: &B::Device,
) -> Vec<f32> {
    let x = tensor2::<B::InnerBackend>(rows, n, input_dim, device);
    value
        .forward(x)
        .squeeze::<1>(1)
        .into_data()
        .to_vec()
        .expect("value tensor should convert to vec")
}
