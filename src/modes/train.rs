//! Training mode: the orchestration loop
//!
//! Owns the step counter and drives the whole run: per-step batch
//! assembly, the functional agent update, and the interval-gated
//! logging, evaluation, and checkpointing side effects.
//!
//! The loop is strictly sequential. Steps run from 1 to `train_steps`
//! inclusive and the run terminates exactly at the configured count;
//! logging fires on multiples of `log_interval`, evaluation at step 1
//! and on multiples of `eval_interval`, checkpoints on multiples of
//! `save_interval`. The intervals are independent and may coincide on
//! the same step.
//!
//! # Example
//!
//! ```rust,ignore
//! use ml_maze::modes::{RunFlags, TrainMode};
//! use ml_maze::rl::{default_device, AgentConfig, TrainingBackend};
//! use clap::Parser;
//!
//! let flags = RunFlags::parse();
//! let config = AgentConfig::default();
//! let device = default_device();
//! TrainMode::<TrainingBackend>::new(flags, config, "exp/run".into(), device)?.run()?;
//! ```

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::eval::{EvalOptions, EvaluationRunner};
use crate::env::obstacles::OBSTACLE_SCAN_RESOLUTION;
use crate::env::{collect_dataset, GoalDataset, MazeEnv, ObstacleSet};
use crate::metrics::{prefixed, run_name, CsvLogger, MetricSink, MetricValue, RunTracker};
use crate::rl::{
    restore_agent, save_agent, Agent, AgentConfig, AgentName, BatchAssembler, ConfigurationError,
    SpeedConditioner, SpeedProfile, DEFAULT_SPEED_MIN,
};

/// Command-line flag surface for a training run
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "ml_maze", version, about = "Offline goal-conditioned RL training")]
pub struct RunFlags {
    /// Run group label, recorded in the tracker header
    #[arg(long, default_value = "experiments")]
    pub run_group: String,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Environment (dataset) name
    #[arg(long, default_value = "pointmaze-medium-navigate")]
    pub env_name: String,

    /// Save directory root
    #[arg(long, default_value = "exp")]
    pub save_dir: PathBuf,

    /// Checkpoint directory to restore from
    #[arg(long)]
    pub restore_path: Option<PathBuf>,

    /// Checkpoint step to restore (latest when omitted)
    #[arg(long)]
    pub restore_epoch: Option<usize>,

    /// Number of training steps
    #[arg(long, default_value_t = 100_000)]
    pub train_steps: usize,

    /// Logging interval
    #[arg(long, default_value_t = 100)]
    pub log_interval: usize,

    /// Evaluation interval
    #[arg(long, default_value_t = 10_000)]
    pub eval_interval: usize,

    /// Checkpoint interval
    #[arg(long, default_value_t = 100_000)]
    pub save_interval: usize,

    /// Number of tasks to evaluate (all when omitted)
    #[arg(long)]
    pub eval_tasks: Option<usize>,

    /// Episodes per task
    #[arg(long, default_value_t = 20)]
    pub eval_episodes: usize,

    /// Actor temperature for evaluation
    #[arg(long, default_value_t = 0.0)]
    pub eval_temperature: f32,

    /// Extra Gaussian action noise for evaluation
    #[arg(long)]
    pub eval_gaussian: Option<f32>,

    /// Video episodes per task
    #[arg(long, default_value_t = 1)]
    pub video_episodes: usize,

    /// Render value-function heatmaps when positive
    #[arg(long, default_value_t = 1)]
    pub plot_value_function: usize,

    /// Frame skip for videos
    #[arg(long, default_value_t = 3)]
    pub video_frame_skip: usize,

    /// Evaluate on the CPU device when positive
    #[arg(long, default_value_t = 1)]
    pub eval_on_cpu: usize,

    /// GPU index; informational with the CPU backend
    #[arg(long, default_value_t = 0)]
    pub gpu_id: usize,

    /// Path to an agent configuration JSON file
    #[arg(long)]
    pub agent_config: Option<PathBuf>,

    /// Override the configured agent name
    #[arg(long)]
    pub agent_name: Option<AgentName>,

    /// Override the configured speed profile
    #[arg(long)]
    pub speed_profile: Option<SpeedProfile>,

    /// Scripted-expert episodes for the offline training dataset
    #[arg(long, default_value_t = 300)]
    pub dataset_episodes: usize,

    /// Scripted-expert episodes for the validation dataset (0 disables
    /// validation)
    #[arg(long, default_value_t = 30)]
    pub val_episodes: usize,
}

impl RunFlags {
    /// Interval sanity checks; fatal before anything is constructed
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("log_interval", self.log_interval),
            ("eval_interval", self.eval_interval),
            ("save_interval", self.save_interval),
            ("dataset_episodes", self.dataset_episodes),
        ] {
            if value == 0 {
                return Err(ConfigurationError::InvalidValue {
                    name,
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Training mode
///
/// Construction performs the whole INIT transition: environment and
/// dataset setup, obstacle scanning, speed attachment, agent creation
/// or restoration, and log sink creation. `run` then owns RUNNING
/// through TERMINATED.
pub struct TrainMode<B: AutodiffBackend> {
    flags: RunFlags,
    config: AgentConfig,
    run_dir: PathBuf,
    env: MazeEnv,
    agent: Agent<B>,
    train_data: GoalDataset,
    val_data: Option<GoalDataset>,
    obstacles: Option<ObstacleSet>,
    conditioner: Option<SpeedConditioner>,
    speed_min: f32,
    tracker: RunTracker,
    train_logger: CsvLogger,
    eval_logger: CsvLogger,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainMode<B> {
    pub fn new(
        flags: RunFlags,
        config: AgentConfig,
        run_dir: PathBuf,
        device: B::Device,
    ) -> Result<Self> {
        flags.validate()?;
        config.validate()?;

        let mut env = MazeEnv::new(&flags.env_name)?;
        let mut rng = StdRng::seed_from_u64(flags.seed);

        info!(episodes = flags.dataset_episodes, "collecting offline dataset");
        let mut train_ds = collect_dataset(&mut env, flags.dataset_episodes, &mut rng);
        let mut val_ds = (flags.val_episodes > 0)
            .then(|| collect_dataset(&mut env, flags.val_episodes, &mut rng));

        let obstacles = (config.speed_profile.is_some() || config.use_obstacles)
            .then(|| ObstacleSet::generate(&env, OBSTACLE_SCAN_RESOLUTION * env.maze_unit()));

        let mut speed_min = DEFAULT_SPEED_MIN;
        let mut conditioner = None;
        if let (Some(profile), Some(set)) = (config.speed_profile, obstacles.as_ref()) {
            let c = SpeedConditioner::new(profile, set.clone(), DEFAULT_SPEED_MIN);
            let speeds = c.speeds(train_ds.observations(), train_ds.obs_dim());
            train_ds.attach_speed(speeds)?;
            if let Some(val) = val_ds.as_mut() {
                let speeds = c.speeds(val.observations(), val.obs_dim());
                val.attach_speed(speeds)?;
            }
            speed_min = c.speed_min();
            conditioner = Some(c);
        }

        let goal_radius = env.goal_radius();
        let train_data = GoalDataset::new(train_ds, &config, goal_radius);
        let val_data = val_ds.map(|ds| GoalDataset::new(ds, &config, goal_radius));

        let example_batch = train_data.sample(1, &mut rng);
        let agent = Agent::create(flags.seed, &example_batch, config.clone(), &device)?;
        let agent = match &flags.restore_path {
            Some(path) => {
                info!(path = %path.display(), "restoring agent");
                restore_agent(agent, path, flags.restore_epoch, &device)?
            }
            None => agent,
        };

        let tracker = RunTracker::create(
            run_dir.join("events.jsonl"),
            json!({
                "name": run_name(&config, run_dir.file_name().and_then(|n| n.to_str()).unwrap_or("run")),
                "group": flags.run_group,
                "env_name": flags.env_name,
            }),
        )?;
        let train_logger = CsvLogger::new(run_dir.join("train.csv"));
        let eval_logger = CsvLogger::new(run_dir.join("eval.csv"));

        Ok(Self {
            flags,
            config,
            run_dir,
            env,
            agent,
            train_data,
            val_data,
            obstacles,
            conditioner,
            speed_min,
            tracker,
            train_logger,
            eval_logger,
            rng,
            device,
        })
    }

    /// Run the training loop to completion
    pub fn run(mut self) -> Result<()> {
        let pb = ProgressBar::new(self.flags.train_steps as u64);
        pb.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}]")
                .expect("valid progress template"),
        );

        let first_time = Instant::now();
        let mut last_time = Instant::now();
        let mut agent = self.agent;

        for i in 1..=self.flags.train_steps {
            // Update. The agent value is replaced wholesale; this call is
            // the only place parameters change.
            let batch = BatchAssembler {
                dataset: &self.train_data,
                obstacles: self.obstacles.as_ref(),
                use_obstacles: self.config.use_obstacles,
                batch_size: self.config.batch_size,
                batch_size_obstacles: self.config.batch_size_obstacles,
                speed_min: self.speed_min,
            }
            .assemble(&mut self.rng);
            let (next_agent, update_info) = agent.update(&batch);
            agent = next_agent;

            // Log.
            if i % self.flags.log_interval == 0 {
                let mut metrics = prefixed("training", &update_info);
                if let Some(val_data) = &self.val_data {
                    let val_batch = BatchAssembler {
                        dataset: val_data,
                        obstacles: self.obstacles.as_ref(),
                        use_obstacles: self.config.use_obstacles,
                        batch_size: self.config.batch_size,
                        batch_size_obstacles: self.config.batch_size_obstacles,
                        speed_min: self.speed_min,
                    }
                    .assemble(&mut self.rng);
                    metrics.extend(prefixed("validation", &agent.loss(&val_batch)));
                }
                metrics.insert(
                    "time/epoch_time".to_string(),
                    MetricValue::Scalar(
                        last_time.elapsed().as_secs_f64() / self.flags.log_interval as f64,
                    ),
                );
                metrics.insert(
                    "time/total_time".to_string(),
                    MetricValue::Scalar(first_time.elapsed().as_secs_f64()),
                );
                last_time = Instant::now();
                self.tracker.log(&metrics, i)?;
                self.train_logger.log(&metrics, i)?;
            }

            // Evaluate. Step 1 establishes the pre-training baseline.
            if i == 1 || i % self.flags.eval_interval == 0 {
                let eval_device = if self.flags.eval_on_cpu > 0 {
                    B::Device::default()
                } else {
                    self.device.clone()
                };
                let eval_agent = agent.fork(&eval_device);
                let options = EvalOptions {
                    eval_tasks: self.flags.eval_tasks,
                    eval_episodes: self.flags.eval_episodes,
                    eval_temperature: self.flags.eval_temperature,
                    eval_gaussian: self.flags.eval_gaussian,
                    video_episodes: self.flags.video_episodes,
                    video_frame_skip: self.flags.video_frame_skip,
                    plot_value_function: self.flags.plot_value_function > 0,
                    value_grid_size: 100,
                };
                let metrics = EvaluationRunner {
                    agent: &eval_agent,
                    env: &mut self.env,
                    conditioner: self.conditioner.as_ref(),
                    options: &options,
                    run_dir: &self.run_dir,
                }
                .run(i)?;
                self.tracker.log(&metrics, i)?;
                self.eval_logger.log(&metrics, i)?;
            }

            // Save.
            if i % self.flags.save_interval == 0 {
                save_agent(&agent, &self.run_dir, i)?;
            }

            pb.inc(1);
        }

        pb.finish();
        self.tracker.close()?;
        self.train_logger.close()?;
        self.eval_logger.close()?;
        info!(
            steps = self.flags.train_steps,
            run_dir = %self.run_dir.display(),
            "training complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::TrainingBackend;
    use burn::backend::ndarray::NdArrayDevice;
    use tempfile::TempDir;

    fn test_flags(run_dir: &std::path::Path) -> RunFlags {
        RunFlags {
            run_group: "test".to_string(),
            seed: 0,
            env_name: "pointmaze-medium-navigate".to_string(),
            save_dir: run_dir.to_path_buf(),
            restore_path: None,
            restore_epoch: None,
            train_steps: 10,
            log_interval: 5,
            eval_interval: 10,
            save_interval: 10,
            eval_tasks: Some(2),
            eval_episodes: 2,
            eval_temperature: 0.0,
            eval_gaussian: None,
            video_episodes: 0,
            plot_value_function: 0,
            video_frame_skip: 3,
            eval_on_cpu: 1,
            gpu_id: 0,
            agent_config: None,
            agent_name: None,
            speed_profile: None,
            dataset_episodes: 5,
            val_episodes: 2,
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            batch_size: 16,
            hidden_dim: 16,
            ..Default::default()
        }
    }

    fn logged_steps(path: &std::path::Path) -> Vec<usize> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_interval_schedule() {
        let dir = TempDir::new().unwrap();
        let flags = test_flags(dir.path());
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, test_config(), dir.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();

        // train_steps=10, log=5, eval=10, save=10:
        assert_eq!(logged_steps(&dir.path().join("train.csv")), vec![5, 10]);
        assert_eq!(logged_steps(&dir.path().join("eval.csv")), vec![1, 10]);
        assert!(dir.path().join("params_10.meta.json").exists());
        assert!(!dir.path().join("params_5.meta.json").exists());
    }

    #[test]
    fn test_validation_metrics_present_when_val_dataset_exists() {
        let dir = TempDir::new().unwrap();
        let flags = test_flags(dir.path());
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, test_config(), dir.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();

        let header = std::fs::read_to_string(dir.path().join("train.csv"))
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        assert!(header.contains("training/actor_loss"));
        assert!(header.contains("validation/actor_loss"));
        assert!(header.contains("time/epoch_time"));
        assert!(header.contains("time/total_time"));
    }

    #[test]
    fn test_no_validation_metrics_without_val_dataset() {
        let dir = TempDir::new().unwrap();
        let mut flags = test_flags(dir.path());
        flags.val_episodes = 0;
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, test_config(), dir.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();

        let header = std::fs::read_to_string(dir.path().join("train.csv"))
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        assert!(!header.contains("validation/"));
    }

    #[test]
    fn test_speed_conditioned_run_with_obstacles() {
        let dir = TempDir::new().unwrap();
        let mut flags = test_flags(dir.path());
        flags.train_steps = 2;
        flags.log_interval = 1;
        flags.eval_interval = 2;
        let config = AgentConfig {
            speed_profile: Some(SpeedProfile::Linear),
            use_obstacles: true,
            batch_size_obstacles: 8,
            batch_size: 16,
            hidden_dim: 16,
            ..Default::default()
        };
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, config, dir.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();

        let header = std::fs::read_to_string(dir.path().join("train.csv"))
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        assert!(header.contains("training/obstacle_loss"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let mut flags = test_flags(dir.path());
        flags.log_interval = 0;
        let device = NdArrayDevice::default();
        assert!(TrainMode::<TrainingBackend>::new(
            flags,
            test_config(),
            dir.path().to_path_buf(),
            device
        )
        .is_err());
    }

    #[test]
    fn test_restore_resumes_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let flags = test_flags(dir.path());
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, test_config(), dir.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();

        // Second run restores from the checkpoint written at step 10.
        let dir2 = TempDir::new().unwrap();
        let mut flags = test_flags(dir2.path());
        flags.restore_path = Some(dir.path().to_path_buf());
        flags.restore_epoch = Some(10);
        flags.train_steps = 1;
        flags.save_interval = 1;
        let device = NdArrayDevice::default();
        TrainMode::<TrainingBackend>::new(flags, test_config(), dir2.path().to_path_buf(), device)
            .unwrap()
            .run()
            .unwrap();
        assert!(dir2.path().join("params_1.meta.json").exists());
    }
}
