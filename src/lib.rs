//! ML Maze - Offline goal-conditioned RL training for maze navigation
//!
//! This library provides:
//! - Maze environment, offline dataset, and obstacle scanning (env module)
//! - Agents, batch assembly, speed conditioning, checkpoints (rl module)
//! - Metric sinks and experiment bookkeeping (metrics module)
//! - Frame/video/heatmap rendering (render module)
//! - The training orchestration loop (modes module)

pub mod env;
pub mod metrics;
pub mod modes;
pub mod render;
pub mod rl;
