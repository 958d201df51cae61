//! Policy and value networks for goal-conditioned agents
//!
//! Both networks are small MLPs over concatenated feature vectors:
//!
//! ```text
//! Policy input: [batch, obs_dim + goal_dim (+ 1 speed)]
//!   ↓ Linear(input → hidden) + ReLU
//!   ↓ Linear(hidden → hidden) + ReLU
//!   ↓ Linear(hidden → action_dim) → tanh → actions in [-1, 1]
//!
//! Value input: [batch, obs_dim + goal_dim]
//!   ↓ Linear(input → hidden) + ReLU
//!   ↓ Linear(hidden → hidden) + ReLU
//!   ↓ Linear(hidden → 1) → V(s, g)
//! ```
//!
//! Observations are low-dimensional vectors, so there is no
//! convolutional trunk.
//!
//! # Example
//!
//! ```rust
//! use ml_maze::rl::{PolicyConfig, PolicyNetwork};
//! use burn::backend::ndarray::NdArrayDevice;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let config = PolicyConfig::new(4, 2, 64);
//! let network = config.init::<Backend>(&device);
//!
//! let input = Tensor::zeros([8, 4], &device);
//! let actions = network.forward(input);
//! assert_eq!(actions.dims(), [8, 2]);
//! ```

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{
        activation::{relu, tanh},
        backend::Backend,
        Tensor,
    },
};

/// Configuration for the policy network
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub input_dim: usize,
    pub action_dim: usize,
    pub hidden_dim: usize,
}

impl PolicyConfig {
    pub fn new(input_dim: usize, action_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input_dim,
            action_dim,
            hidden_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNetwork<B> {
        PolicyNetwork {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            head: LinearConfig::new(self.hidden_dim, self.action_dim).init(device),
        }
    }
}

/// Deterministic goal-conditioned policy MLP
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> PolicyNetwork<B> {
    /// Forward pass: `[batch, input_dim]` → actions in `[-1, 1]` with
    /// shape `[batch, action_dim]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(input));
        let x = relu(self.fc2.forward(x));
        tanh(self.head.forward(x))
    }
}

/// Configuration for the goal-conditioned value network
#[derive(Debug, Clone)]
pub struct ValueConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
}

impl ValueConfig {
    pub fn new(input_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ValueNetwork<B> {
        ValueNetwork {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            head: LinearConfig::new(self.hidden_dim, 1).init(device),
        }
    }
}

/// Goal-conditioned value MLP, `V(s, g)`
#[derive(Module, Debug)]
pub struct ValueNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> ValueNetwork<B> {
    /// Forward pass: `[batch, input_dim]` → `[batch, 1]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(input));
        let x = relu(self.fc2.forward(x));
        self.head.forward(x)
    }
}
