//! Checkpoint lifecycle for trained agents
//!
//! Checkpoints are step-keyed artifacts in the run directory, using
//! Burn's Record system for the network weights plus a JSON metadata
//! sidecar:
//!
//! - `params_{step}_policy.mpk` - policy weights
//! - `params_{step}_value.mpk` - value weights (value-based agents only)
//! - `params_{step}.meta.json` - agent kind, configuration, dimensions
//!
//! Saving never overwrites a prior step's artifact. Restoration happens
//! once at startup, into a freshly-created template agent of matching
//! structure.

use anyhow::{bail, Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::agent::Agent;
use super::config::{AgentConfig, AgentName};

/// Error raised when checkpoint restoration cannot produce a valid agent
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("checkpoint metadata not found at {0}")]
    NotFound(PathBuf),

    #[error("no checkpoints found under {0}")]
    NoCheckpoints(PathBuf),

    #[error("checkpoint was written by agent '{found}' but the template is '{expected}'")]
    AgentMismatch { expected: String, found: String },

    #[error(
        "checkpoint dimensions (obs {found_obs}, action {found_action}) do not match \
         template (obs {expected_obs}, action {expected_action})"
    )]
    DimensionMismatch {
        expected_obs: usize,
        expected_action: usize,
        found_obs: usize,
        found_action: usize,
    },

    #[error("failed to read checkpoint: {0}")]
    Storage(String),
}

/// Metadata saved alongside the network weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub agent_name: AgentName,
    pub config: AgentConfig,
    pub obs_dim: usize,
    pub action_dim: usize,
    pub step: usize,
    pub version: String,
}

fn meta_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("params_{step}.meta.json"))
}

fn policy_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("params_{step}_policy"))
}

fn value_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("params_{step}_value"))
}

/// Save an agent checkpoint keyed by training step
///
/// Refuses to overwrite an existing artifact for the same step.
pub fn save_agent<B: AutodiffBackend>(agent: &Agent<B>, dir: &Path, step: usize) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create checkpoint directory: {:?}", dir))?;

    let meta = meta_path(dir, step);
    if meta.exists() {
        bail!("checkpoint for step {} already exists at {:?}", step, meta);
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    match agent {
        Agent::Gcbc(a) => {
            recorder
                .record(a.policy().clone().into_record(), policy_path(dir, step))
                .context("Failed to save policy weights")?;
        }
        Agent::Gciql(a) => {
            recorder
                .record(a.policy().clone().into_record(), policy_path(dir, step))
                .context("Failed to save policy weights")?;
            recorder
                .record(a.value_network().clone().into_record(), value_path(dir, step))
                .context("Failed to save value weights")?;
        }
    }

    let metadata = CheckpointMetadata {
        agent_name: agent.name(),
        config: agent.config().clone(),
        obs_dim: agent.obs_dim(),
        action_dim: agent.action_dim(),
        step,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let meta_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    std::fs::write(&meta, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta))?;

    Ok(())
}

/// Restore an agent checkpoint into a template agent
///
/// Loads the artifact for `epoch`, or the latest step found under the
/// directory when unspecified. The template fixes the expected agent
/// kind and dimensions; any mismatch is a [`RestoreError`].
pub fn restore_agent<B: AutodiffBackend>(
    template: Agent<B>,
    path: &Path,
    epoch: Option<usize>,
    device: &B::Device,
) -> Result<Agent<B>, RestoreError> {
    let step = match epoch {
        Some(step) => step,
        None => latest_step(path)?,
    };

    let meta = meta_path(path, step);
    if !meta.exists() {
        return Err(RestoreError::NotFound(meta));
    }
    let meta_json =
        std::fs::read_to_string(&meta).map_err(|e| RestoreError::Storage(e.to_string()))?;
    let metadata: CheckpointMetadata =
        serde_json::from_str(&meta_json).map_err(|e| RestoreError::Storage(e.to_string()))?;

    if metadata.agent_name != template.name() {
        return Err(RestoreError::AgentMismatch {
            expected: template.name().to_string(),
            found: metadata.agent_name.to_string(),
        });
    }
    if metadata.obs_dim != template.obs_dim() || metadata.action_dim != template.action_dim() {
        return Err(RestoreError::DimensionMismatch {
            expected_obs: template.obs_dim(),
            expected_action: template.action_dim(),
            found_obs: metadata.obs_dim,
            found_action: metadata.action_dim,
        });
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    match template {
        Agent::Gcbc(agent) => {
            let record = recorder
                .load(policy_path(path, step), device)
                .map_err(|e| RestoreError::Storage(e.to_string()))?;
            Ok(Agent::Gcbc(agent.load_policy(record)))
        }
        Agent::Gciql(agent) => {
            let policy_record = recorder
                .load(policy_path(path, step), device)
                .map_err(|e| RestoreError::Storage(e.to_string()))?;
            let value_record = recorder
                .load(value_path(path, step), device)
                .map_err(|e| RestoreError::Storage(e.to_string()))?;
            Ok(Agent::Gciql(
                agent.load_policy(policy_record).load_value(value_record),
            ))
        }
    }
}

/// Highest step among the checkpoints in the directory
fn latest_step(dir: &Path) -> Result<usize, RestoreError> {
    let entries =
        std::fs::read_dir(dir).map_err(|_| RestoreError::NoCheckpoints(dir.to_path_buf()))?;
    let mut latest = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(step) = name
            .strip_prefix("params_")
            .and_then(|rest| rest.strip_suffix(".meta.json"))
            .and_then(|step| step.parse::<usize>().ok())
        else {
            continue;
        };
        latest = Some(latest.map_or(step, |best: usize| best.max(step)));
    }
    latest.ok_or_else(|| RestoreError::NoCheckpoints(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::batch::Batch;
    use crate::rl::{AgentName, TrainingBackend};
    use burn::backend::ndarray::NdArrayDevice;
    use tempfile::TempDir;

    fn example_batch(size: usize) -> Batch {
        Batch {
            size,
            obs_dim: 2,
            action_dim: 2,
            observations: (0..size * 2).map(|i| i as f32 * 0.1).collect(),
            next_observations: (0..size * 2).map(|i| i as f32 * 0.1 + 0.02).collect(),
            actions: vec![0.3; size * 2],
            goals: vec![1.0; size * 2],
            rewards: vec![0.0; size],
            masks: vec![1.0; size],
            speed: None,
            obstacles: None,
            speed_obstacles: None,
        }
    }

    fn create_agent(seed: u64, name: AgentName) -> Agent<TrainingBackend> {
        let device = NdArrayDevice::default();
        let config = AgentConfig {
            agent_name: name,
            hidden_dim: 32,
            ..Default::default()
        };
        Agent::create(seed, &example_batch(1), config, &device).unwrap()
    }

    #[test]
    fn test_save_creates_artifacts() {
        let dir = TempDir::new().unwrap();
        let agent = create_agent(0, AgentName::Gciql);
        save_agent(&agent, dir.path(), 100).unwrap();

        assert!(dir.path().join("params_100.meta.json").exists());
        assert!(dir.path().join("params_100_policy.mpk").exists());
        assert!(dir.path().join("params_100_value.mpk").exists());
    }

    #[test]
    fn test_save_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let agent = create_agent(0, AgentName::Gcbc);
        save_agent(&agent, dir.path(), 10).unwrap();
        assert!(save_agent(&agent, dir.path(), 10).is_err());
        // A different step is fine.
        save_agent(&agent, dir.path(), 20).unwrap();
    }

    #[test]
    fn test_restore_missing_fails() {
        let dir = TempDir::new().unwrap();
        let device = NdArrayDevice::default();
        let template = create_agent(0, AgentName::Gcbc);
        let err = restore_agent(template, dir.path(), None, &device).unwrap_err();
        assert!(matches!(err, RestoreError::NoCheckpoints(_)));
    }

    #[test]
    fn test_restore_wrong_epoch_fails() {
        let dir = TempDir::new().unwrap();
        let device = NdArrayDevice::default();
        let agent = create_agent(0, AgentName::Gcbc);
        save_agent(&agent, dir.path(), 10).unwrap();

        let template = create_agent(0, AgentName::Gcbc);
        let err = restore_agent(template, dir.path(), Some(99), &device).unwrap_err();
        assert!(matches!(err, RestoreError::NotFound(_)));
    }

    #[test]
    fn test_restore_agent_kind_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let device = NdArrayDevice::default();
        let agent = create_agent(0, AgentName::Gcbc);
        save_agent(&agent, dir.path(), 10).unwrap();

        let template = create_agent(0, AgentName::Gciql);
        let err = restore_agent(template, dir.path(), Some(10), &device).unwrap_err();
        assert!(matches!(err, RestoreError::AgentMismatch { .. }));
    }

    #[test]
    fn test_restore_picks_latest_step() {
        let dir = TempDir::new().unwrap();
        let device = NdArrayDevice::default();
        let mut agent = create_agent(0, AgentName::Gcbc);
        save_agent(&agent, dir.path(), 10).unwrap();
        let (next, _) = agent.update(&example_batch(8));
        agent = next;
        save_agent(&agent, dir.path(), 20).unwrap();

        let template = create_agent(1, AgentName::Gcbc);
        let restored = restore_agent(template, dir.path(), None, &device).unwrap();
        // The latest checkpoint reproduces the post-update policy.
        let expected = agent.sample_actions(&[0.5, 0.5], &[1.0, 1.0], None, 0.0, None);
        let actual = restored.sample_actions(&[0.5, 0.5], &[1.0, 1.0], None, 0.0, None);
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_round_trip_reproduces_update_info() {
        let dir = TempDir::new().unwrap();
        let device = NdArrayDevice::default();
        let agent = create_agent(0, AgentName::Gciql);
        save_agent(&agent, dir.path(), 1).unwrap();

        let template = create_agent(0, AgentName::Gciql);
        let restored = restore_agent(template, dir.path(), Some(1), &device).unwrap();

        // Identical parameters, identical batch, fresh optimizers on both
        // sides: the update diagnostics must match exactly.
        let batch = example_batch(16);
        let (_a, info_original) = agent.update(&batch);
        let (_b, info_restored) = restored.update(&batch);
        assert_eq!(info_original, info_restored);
    }
}
