//! Agents, batch assembly, conditioning, and checkpointing
//!
//! Provides:
//! - The tagged `Agent` over goal-conditioned agent kinds
//! - Batch assembly with obstacle augmentation
//! - Obstacle-aware speed conditioning profiles
//! - Backend aliases and checkpoint persistence

pub mod agent;
pub mod backend;
pub mod batch;
pub mod conditioning;
pub mod config;
pub mod gcbc;
pub mod gciql;
pub mod network;
pub mod persistence;

pub use agent::{Agent, UpdateInfo};
pub use backend::{default_device, InferenceBackend, TrainingBackend};
pub use batch::{Batch, BatchAssembler};
pub use conditioning::{SpeedConditioner, DEFAULT_SPEED_MIN};
pub use config::{
    ActorLoss, AgentConfig, AgentName, ConfigurationError, DatasetClass, SpeedProfile,
};
pub use gcbc::GcbcAgent;
pub use gciql::GciqlAgent;
pub use network::{PolicyConfig, PolicyNetwork, ValueConfig, ValueNetwork};
pub use persistence::{restore_agent, save_agent, RestoreError};
