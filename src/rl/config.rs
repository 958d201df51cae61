//! Agent configuration and startup validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error raised for an invalid run configuration.
///
/// Every variant is detected before the first training step; a run never
/// starts with a configuration it cannot honor.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown agent name '{0}' (expected one of: gcbc, gciql)")]
    UnknownAgent(String),

    #[error("unknown speed profile '{0}' (expected one of: linear, exponential, constant)")]
    UnknownSpeedProfile(String),

    #[error("unknown dataset class '{0}' (expected: gc)")]
    UnknownDatasetClass(String),

    #[error("unknown actor loss '{0}' (expected one of: awr, bc)")]
    UnknownActorLoss(String),

    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("discrete action spaces are not supported by the bundled agents")]
    DiscreteUnsupported,

    #[error("invalid value for {name}: {message}")]
    InvalidValue {
        name: &'static str,
        message: String,
    },
}

/// Agent implementation selector.
///
/// Each name maps to one variant of [`crate::rl::Agent`]; there is no
/// string-keyed dispatch past the configuration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    /// Goal-conditioned behavioral cloning (policy only)
    Gcbc,
    /// Goal-conditioned IQL-style agent (policy + value function)
    Gciql,
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentName::Gcbc => write!(f, "gcbc"),
            AgentName::Gciql => write!(f, "gciql"),
        }
    }
}

impl FromStr for AgentName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gcbc" => Ok(AgentName::Gcbc),
            "gciql" => Ok(AgentName::Gciql),
            other => Err(ConfigurationError::UnknownAgent(other.to_string())),
        }
    }
}

/// Speed profile shaping the obstacle-aware conditioning scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedProfile {
    /// Linear ramp from `speed_min` at an obstacle up to 1.0 at the falloff radius
    Linear,
    /// Exponential ramp; stays close to `speed_min` longer near obstacles
    Exponential,
    /// Ignores obstacle distances entirely; every observation gets speed 1.0
    Constant,
}

impl fmt::Display for SpeedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedProfile::Linear => write!(f, "linear"),
            SpeedProfile::Exponential => write!(f, "exponential"),
            SpeedProfile::Constant => write!(f, "constant"),
        }
    }
}

impl FromStr for SpeedProfile {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(SpeedProfile::Linear),
            "exponential" => Ok(SpeedProfile::Exponential),
            "constant" => Ok(SpeedProfile::Constant),
            other => Err(ConfigurationError::UnknownSpeedProfile(other.to_string())),
        }
    }
}

/// Goal-relabeling scheme applied when sampling batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetClass {
    /// Goal-conditioned relabeling: future states and random states as goals
    Gc,
}

impl FromStr for DatasetClass {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gc" => Ok(DatasetClass::Gc),
            other => Err(ConfigurationError::UnknownDatasetClass(other.to_string())),
        }
    }
}

/// Actor objective used by value-based agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorLoss {
    /// Advantage-weighted regression
    Awr,
    /// Plain behavioral cloning (unweighted)
    Bc,
}

impl fmt::Display for ActorLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorLoss::Awr => write!(f, "awr"),
            ActorLoss::Bc => write!(f, "bc"),
        }
    }
}

impl FromStr for ActorLoss {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awr" => Ok(ActorLoss::Awr),
            "bc" => Ok(ActorLoss::Bc),
            other => Err(ConfigurationError::UnknownActorLoss(other.to_string())),
        }
    }
}

/// Configuration for the agent and its dataset interaction
///
/// All optional features are explicit defaulted fields, resolved once at
/// startup; the training loop only ever does plain value checks.
///
/// # Example
///
/// ```rust
/// use ml_maze::rl::AgentConfig;
///
/// let config = AgentConfig::default();
/// assert!(config.validate().is_ok());
///
/// let config = AgentConfig {
///     batch_size: 512,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Which agent implementation to train
    pub agent_name: AgentName,

    /// Minibatch size for each update step
    pub batch_size: usize,

    /// Discrete action space marker. The bundled maze environment is
    /// continuous, so enabling this fails validation.
    pub discrete: bool,

    /// Goal-relabeling scheme for batch sampling
    pub dataset_class: DatasetClass,

    /// Obstacle-aware speed conditioning profile; `None` disables the
    /// speed field entirely
    pub speed_profile: Option<SpeedProfile>,

    /// Projection variant marker; carried into the experiment name
    pub projection: bool,

    /// Whether to augment batches with sampled obstacle coordinates
    pub use_obstacles: bool,

    /// Number of obstacle coordinates sampled per batch
    pub batch_size_obstacles: usize,

    /// Actor objective for value-based agents; `None` selects AWR
    pub actor_loss: Option<ActorLoss>,

    /// Learning rate for the Adam optimizers
    pub learning_rate: f64,

    /// Discount factor; also drives the geometric future-goal offset
    pub discount: f32,

    /// Expectile for the value regression loss
    pub expectile: f32,

    /// Inverse temperature for AWR advantage weights
    pub awr_temperature: f32,

    /// Hidden width of the policy and value MLPs
    pub hidden_dim: usize,

    /// Probability of relabeling with a uniformly random goal instead of a
    /// future state from the same trajectory
    pub p_random_goal: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: AgentName::Gciql,
            batch_size: 256,
            discrete: false,
            dataset_class: DatasetClass::Gc,
            speed_profile: None,
            projection: false,
            use_obstacles: false,
            batch_size_obstacles: 64,
            actor_loss: None,
            learning_rate: 3e-4,
            discount: 0.99,
            expectile: 0.7,
            awr_temperature: 3.0,
            hidden_dim: 256,
            p_random_goal: 0.3,
        }
    }
}

impl AgentConfig {
    /// Validate the configuration
    ///
    /// Called once at startup, before any dataset or agent construction.
    /// A failure here is fatal; nothing is partially initialized.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.discrete {
            return Err(ConfigurationError::DiscreteUnsupported);
        }

        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                name: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }

        if self.use_obstacles && self.batch_size_obstacles == 0 {
            return Err(ConfigurationError::InvalidValue {
                name: "batch_size_obstacles",
                message: "must be at least 1 when use_obstacles is set".to_string(),
            });
        }

        if self.learning_rate <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                name: "learning_rate",
                message: format!("must be positive, got {}", self.learning_rate),
            });
        }

        if !(0.0..1.0).contains(&self.discount) {
            return Err(ConfigurationError::InvalidValue {
                name: "discount",
                message: format!("must be in [0, 1), got {}", self.discount),
            });
        }

        if self.expectile <= 0.0 || self.expectile >= 1.0 {
            return Err(ConfigurationError::InvalidValue {
                name: "expectile",
                message: format!("must be in (0, 1), got {}", self.expectile),
            });
        }

        if self.awr_temperature <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                name: "awr_temperature",
                message: format!("must be positive, got {}", self.awr_temperature),
            });
        }

        if self.hidden_dim == 0 {
            return Err(ConfigurationError::InvalidValue {
                name: "hidden_dim",
                message: "must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.p_random_goal) {
            return Err(ConfigurationError::InvalidValue {
                name: "p_random_goal",
                message: format!("must be in [0, 1], got {}", self.p_random_goal),
            });
        }

        Ok(())
    }

    /// Actor objective with the AWR default applied
    pub fn resolved_actor_loss(&self) -> ActorLoss {
        self.actor_loss.unwrap_or(ActorLoss::Awr)
    }
}
