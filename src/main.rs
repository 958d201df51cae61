use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ml_maze::metrics::{exp_name, run_dir};
use ml_maze::modes::{RunFlags, TrainMode};
use ml_maze::rl::{default_device, AgentConfig, TrainingBackend};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flags = RunFlags::parse();

    // Resolve the agent configuration once, before anything is built.
    let mut config = match &flags.agent_config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read agent config {:?}", path))?;
            serde_json::from_str::<AgentConfig>(&text)
                .with_context(|| format!("Failed to parse agent config {:?}", path))?
        }
        None => AgentConfig::default(),
    };
    if let Some(agent_name) = flags.agent_name {
        config.agent_name = agent_name;
    }
    if let Some(profile) = flags.speed_profile {
        config.speed_profile = Some(profile);
    }
    config.validate()?;
    flags.validate()?;

    let exp = exp_name(flags.seed);
    let run_dir = run_dir(&flags.save_dir, &flags.env_name, &config, &exp);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory {:?}", run_dir))?;

    let snapshot = serde_json::json!({ "flags": &flags, "agent": &config });
    std::fs::write(
        run_dir.join("flags.json"),
        serde_json::to_string_pretty(&snapshot)?,
    )
    .context("Failed to write flags.json")?;

    info!(
        gpu_id = flags.gpu_id,
        run_dir = %run_dir.display(),
        "starting run (ndarray backend runs on CPU)"
    );

    let device = default_device();
    TrainMode::<TrainingBackend>::new(flags, config, run_dir, device)?.run()
}
