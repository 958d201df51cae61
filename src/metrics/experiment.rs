//! Experiment naming and run directory layout
//!
//! Runs live under
//! `save_dir/env_name/agent_name/<variant tags>/exp_name`, where the
//! variant tags encode the actor loss, speed profile, and projection
//! setting when configured, and `exp_name` is a UTC timestamp plus the
//! seed.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::rl::AgentConfig;

/// Timestamped experiment name, unique per (launch time, seed)
pub fn exp_name(seed: u64) -> String {
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), seed)
}

/// Variant tags for the run directory and tracker name; empty when the
/// configuration enables none of the named variants
pub fn variant_tags(config: &AgentConfig) -> String {
    let mut parts = Vec::new();
    if let Some(actor_loss) = config.actor_loss {
        parts.push(actor_loss.to_string());
    }
    if let Some(profile) = config.speed_profile {
        parts.push(profile.to_string());
        parts.push(format!("projection_{}", config.projection));
    }
    parts.join("_")
}

/// Run directory for this configuration
pub fn run_dir(save_dir: &Path, env_name: &str, config: &AgentConfig, exp: &str) -> PathBuf {
    let mut dir = save_dir
        .join(env_name)
        .join(config.agent_name.to_string());
    let tags = variant_tags(config);
    if !tags.is_empty() {
        dir = dir.join(tags);
    }
    dir.join(exp)
}

/// Display name for the tracker header
pub fn run_name(config: &AgentConfig, exp: &str) -> String {
    let tags = variant_tags(config);
    if tags.is_empty() {
        format!("{}_{}", exp, config.agent_name)
    } else {
        format!("{}_{}_{}", exp, config.agent_name, tags)
    }
}
