//! Goal-conditioned behavioral cloning agent
//!
//! The simplest agent kind: a deterministic policy regressed onto the
//! dataset actions with MSE. Policy-only, so it exposes no value
//! function and value plots are skipped for it.

use burn::{
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, Distribution, ElementConversion, Tensor},
};

use super::agent::{policy_inputs, tensor2, UpdateInfo};
use super::batch::Batch;
use super::config::AgentConfig;
use super::network::{PolicyConfig, PolicyNetwork, PolicyNetworkRecord};

/// Behavioral cloning agent
pub struct GcbcAgent<B: AutodiffBackend> {
    policy: PolicyNetwork<B>,
    optim: OptimizerAdaptor<Adam<B::InnerBackend>, PolicyNetwork<B>, B>,
    config: AgentConfig,
    obs_dim: usize,
    action_dim: usize,
    conditioned: bool,
    device: B::Device,
}

impl<B: AutodiffBackend> GcbcAgent<B> {
    pub fn create(example: &Batch, config: AgentConfig, device: &B::Device) -> Self {
        let conditioned = config.speed_profile.is_some();
        let input_dim = example.obs_dim * 2 + usize::from(conditioned);
        let policy =
            PolicyConfig::new(input_dim, example.action_dim, config.hidden_dim).init(device);
        let optim = AdamConfig::new().init();
        Self {
            policy,
            optim,
            config,
            obs_dim: example.obs_dim,
            action_dim: example.action_dim,
            conditioned,
            device: device.clone(),
        }
    }

    /// One MSE regression step onto the batch actions
    pub fn update(mut self, batch: &Batch) -> (Self, UpdateInfo) {
        let (inputs, input_dim) = policy_inputs(batch, self.conditioned);
        let x = tensor2::<B>(&inputs, batch.size, input_dim, &self.device);
        let target = tensor2::<B>(&batch.actions, batch.size, batch.action_dim, &self.device);

        let pred = self.policy.forward(x);
        let err = pred - target;
        let loss = (err.clone() * err).mean();

        let actor_loss = loss.clone().into_scalar().elem::<f32>();
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.policy);
        self.policy = self
            .optim
            .step(self.config.learning_rate, self.policy.clone(), grads);

        let mut info = UpdateInfo::new();
        info.insert("actor_loss".to_string(), actor_loss);
        (self, info)
    }

    /// Loss diagnostics on a validation batch; no parameters change
    pub fn loss(&self, batch: &Batch) -> UpdateInfo {
        let (inputs, input_dim) = policy_inputs(batch, self.conditioned);
        let policy = self.policy.valid();
        let x = tensor2::<B::InnerBackend>(&inputs, batch.size, input_dim, &self.device);
        let target =
            tensor2::<B::InnerBackend>(&batch.actions, batch.size, batch.action_dim, &self.device);

        let err = policy.forward(x) - target;
        let actor_loss = (err.clone() * err).mean().into_scalar().elem::<f32>();

        let mut info = UpdateInfo::new();
        info.insert("actor_loss".to_string(), actor_loss);
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

    pub fn fork(&self, device: &B::Device) -> Self {
        Self {
            policy: self.policy.clone().fork(device),
            optim: AdamConfig::new().init(),
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

    pub(crate) fn policy(&self) -> &PolicyNetwork<B> {
        &self.policy
    }

    pub(crate) fn load_policy(mut self, record: PolicyNetworkRecord<B>) -> Self {
        self.policy = self.policy.load_record(record);
        self
    }
}
