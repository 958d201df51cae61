//! Agent capability interface
//!
//! `Agent` is a tagged variant over the concrete agent kinds; the
//! configuration's `agent_name` maps to exactly one variant at startup
//! and nothing downstream dispatches on strings.
//!
//! Updates are functional: `update` consumes the agent and returns a new
//! one together with an info mapping. The agent is never mutated in
//! place, which keeps checkpointing and cross-device snapshots safe
//! without synchronization.

use burn::tensor::{backend::AutodiffBackend, backend::Backend, Tensor, TensorData};
use std::collections::BTreeMap;

use super::batch::Batch;
use super::config::{AgentConfig, AgentName, ConfigurationError};
use super::gcbc::GcbcAgent;
use super::gciql::GciqlAgent;

/// Scalar diagnostics produced by an update or loss evaluation
pub type UpdateInfo = BTreeMap<String, f32>;

/// Goal-conditioned agent
pub enum Agent<B: AutodiffBackend> {
    Gcbc(GcbcAgent<B>),
    Gciql(GciqlAgent<B>),
}

impl<B: AutodiffBackend> std::fmt::Debug for Agent<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Agent::Gcbc(_) => f.write_str("Agent::Gcbc"),
            Agent::Gciql(_) => f.write_str("Agent::Gciql"),
        }
    }
}

impl<B: AutodiffBackend> Agent<B> {
    /// Create an agent from a validated configuration and an example
    /// batch that fixes the observation and action dimensionalities.
    ///
    /// Seeds the backend RNG once; network initialization is
    /// deterministic for a given seed.
    pub fn create(
        seed: u64,
        example: &Batch,
        config: AgentConfig,
        device: &B::Device,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        B::seed(seed);
        Ok(match config.agent_name {
            AgentName::Gcbc => Agent::Gcbc(GcbcAgent::create(example, config, device)),
            AgentName::Gciql => Agent::Gciql(GciqlAgent::create(example, config, device)),
        })
    }

    /// One gradient step: `(Agent, Batch) -> (Agent, Info)`
    pub fn update(self, batch: &Batch) -> (Self, UpdateInfo) {
        match self {
            Agent::Gcbc(agent) => {
                let (agent, info) = agent.update(batch);
                (Agent::Gcbc(agent), info)
            }
            Agent::Gciql(agent) => {
                let (agent, info) = agent.update(batch);
                (Agent::Gciql(agent), info)
            }
        }
    }

    /// Loss diagnostics without mutating the agent (validation path)
    pub fn loss(&self, batch: &Batch) -> UpdateInfo {
        match self {
            Agent::Gcbc(agent) => agent.loss(batch),
            Agent::Gciql(agent) => agent.loss(batch),
        }
    }

    /// Sample an action for a single observation/goal pair
    ///
    /// `temperature` and `gaussian` add zero-mean Gaussian noise with the
    /// given standard deviations; both at zero/`None` the policy is
    /// deterministic. Actions are clamped to [-1, 1].
    pub fn sample_actions(
        &self,
        observation: &[f32],
        goal: &[f32],
        speed: Option<f32>,
        temperature: f32,
        gaussian: Option<f32>,
    ) -> Vec<f32> {
        match self {
            Agent::Gcbc(agent) => agent.sample_actions(observation, goal, speed, temperature, gaussian),
            Agent::Gciql(agent) => agent.sample_actions(observation, goal, speed, temperature, gaussian),
        }
    }

    /// Value estimates for a flat array of observation points against a
    /// fixed goal; `None` for policy-only agents
    pub fn value(&self, points: &[f32], goal: &[f32]) -> Option<Vec<f32>> {
        match self {
            Agent::Gcbc(_) => None,
            Agent::Gciql(agent) => Some(agent.value(points, goal)),
        }
    }

    /// Immutable parameter snapshot on the given device
    ///
    /// The training-side agent is untouched; the snapshot carries fresh
    /// optimizer state, which evaluation never uses.
    pub fn fork(&self, device: &B::Device) -> Self {
        match self {
            Agent::Gcbc(agent) => Agent::Gcbc(agent.fork(device)),
            Agent::Gciql(agent) => Agent::Gciql(agent.fork(device)),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        match self {
            Agent::Gcbc(agent) => agent.config(),
            Agent::Gciql(agent) => agent.config(),
        }
    }

    pub fn name(&self) -> AgentName {
        match self {
            Agent::Gcbc(_) => AgentName::Gcbc,
            Agent::Gciql(_) => AgentName::Gciql,
        }
    }

    pub fn obs_dim(&self) -> usize {
        match self {
            Agent::Gcbc(agent) => agent.obs_dim(),
            Agent::Gciql(agent) => agent.obs_dim(),
        }
    }

    pub fn action_dim(&self) -> usize {
        match self {
            Agent::Gcbc(agent) => agent.action_dim(),
            Agent::Gciql(agent) => agent.action_dim(),
        }
    }
}

/// Build a 2-D tensor from flat row-major data
pub(crate) fn tensor2<B: Backend>(
    data: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(data.to_vec(), [rows, cols]), device)
}

/// Build a 1-D tensor from a slice
pub(crate) fn tensor1<B: Backend>(data: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(data.to_vec(), [data.len()]), device)
}

/// Per-row policy inputs: `[obs ‖ goal (‖ speed)]`
///
/// A speed-conditioned agent fed a batch without a speed column (the
/// validation path mirrors training, so this does not happen in a
/// consistent run) falls back to full speed.
pub(crate) fn policy_inputs(batch: &Batch, conditioned: bool) -> (Vec<f32>, usize) {
    let input_dim = batch.obs_dim * 2 + usize::from(conditioned);
    let mut inputs = Vec::with_capacity(batch.size * input_dim);
    for i in 0..batch.size {
        inputs.extend_from_slice(&batch.observations[i * batch.obs_dim..(i + 1) * batch.obs_dim]);
        inputs.extend_from_slice(&batch.goals[i * batch.obs_dim..(i + 1) * batch.obs_dim]);
        if conditioned {
            inputs.push(batch.speed.as_ref().map_or(1.0, |s| s[i]));
        }
    }
    (inputs, input_dim)
}

pub(crate) fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
