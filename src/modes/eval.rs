//! Multi-task evaluation
//!
//! Runs rollouts for each task in the environment's task list, records
//! per-task and overall success rates, captures video frames for the
//! first episodes of each task, and optionally renders value-function
//! heatmaps for agents that expose a value function.
//!
//! Any error during a rollout aborts the whole evaluation pass and
//! propagates to the caller; there is no per-episode retry.

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use std::path::Path;

use crate::env::MazeEnv;
use crate::metrics::{MetricValue, Metrics};
use crate::render::{compose_grid_video, render_value_heatmap, write_ppm, Frame};
use crate::rl::{Agent, SpeedConditioner};

/// Evaluation settings, lifted from the run flags
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Cap on the number of tasks evaluated; `None` evaluates all
    pub eval_tasks: Option<usize>,
    /// Rollouts per task
    pub eval_episodes: usize,
    /// Action sampling temperature
    pub eval_temperature: f32,
    /// Extra Gaussian action noise
    pub eval_gaussian: Option<f32>,
    /// Episodes per task with frame capture
    pub video_episodes: usize,
    /// Capture every n-th frame
    pub video_frame_skip: usize,
    /// Whether to render value-function heatmaps
    pub plot_value_function: bool,
    /// Side length of the value-function scan grid
    pub value_grid_size: usize,
}

/// Executes one evaluation pass over the task list
pub struct EvaluationRunner<'a, B: AutodiffBackend> {
    pub agent: &'a Agent<B>,
    pub env: &'a mut MazeEnv,
    pub conditioner: Option<&'a SpeedConditioner>,
    pub options: &'a EvalOptions,
    pub run_dir: &'a Path,
}

impl<B: AutodiffBackend> EvaluationRunner<'_, B> {
    /// Run the full pass and return the evaluation metrics for `step`
    pub fn run(mut self, step: usize) -> Result<Metrics> {
        let task_total = self.env.task_infos().len();
        let task_count = self
            .options
            .eval_tasks
            .map_or(task_total, |cap| cap.min(task_total));

        let mut metrics = Metrics::new();
        let mut renders: Vec<Vec<Frame>> = Vec::new();
        let mut success_rates = Vec::with_capacity(task_count);

        for task_id in 1..=task_count {
            let task_name = self.env.task_infos()[task_id - 1].task_name.clone();
            let (success_rate, task_renders) = self.evaluate_task(task_id)?;
            metrics.insert(
                format!("evaluation/{task_name}_success"),
                MetricValue::from(success_rate),
            );
            success_rates.push(success_rate);
            renders.extend(task_renders);

            if self.options.plot_value_function {
                self.render_value_plots(task_id, step)?;
            }
        }

        let overall = success_rates.iter().sum::<f32>() / task_count.max(1) as f32;
        metrics.insert(
            "evaluation/overall_success".to_string(),
            MetricValue::from(overall),
        );

        if self.options.video_episodes > 0 {
            if let Some(video) = compose_grid_video(&renders, task_count) {
                metrics.insert("video".to_string(), MetricValue::Video(video));
            }
        }

        Ok(metrics)
    }

    /// All episodes for one task: success rate plus captured episodes
    fn evaluate_task(&mut self, task_id: usize) -> Result<(f32, Vec<Vec<Frame>>)> {
        let mut successes = 0usize;
        let mut renders = Vec::new();

        for episode in 0..self.options.eval_episodes {
            let record_video = episode < self.options.video_episodes;
            let (mut obs, goal) = self.env.reset_to_task(task_id)?;
            let mut frames = Vec::new();
            let mut succeeded = false;
            let mut step_idx = 0usize;

            loop {
                if record_video && step_idx % self.options.video_frame_skip.max(1) == 0 {
                    frames.push(self.env.render());
                }
                let speed = self.conditioner.map(|c| c.speed_at(&obs));
                let action = self.agent.sample_actions(
                    &obs,
                    &goal,
                    speed,
                    self.options.eval_temperature,
                    self.options.eval_gaussian,
                );
                let result = self.env.step(&action);
                obs = result.observation;
                succeeded |= result.success;
                step_idx += 1;
                if result.terminated {
                    break;
                }
            }

            if succeeded {
                successes += 1;
            }
            if record_video {
                frames.push(self.env.render());
                renders.push(frames);
            }
        }

        let rate = successes as f32 / self.options.eval_episodes.max(1) as f32;
        Ok((rate, renders))
    }

    /// Value-function heatmaps with and without the maze overlay;
    /// silently skipped for policy-only agents
    fn render_value_plots(&self, task_id: usize, step: usize) -> Result<()> {
        let grid = self.options.value_grid_size;
        let (width, height) = self.env.bounds();
        let goal = self.env.task_infos()[task_id - 1].goal;

        let mut points = Vec::with_capacity(grid * grid * 2);
        let mut walls = Vec::with_capacity(grid * grid);
        for gy in 0..grid {
            for gx in 0..grid {
                let x = (gx as f32 + 0.5) / grid as f32 * width;
                let y = (gy as f32 + 0.5) / grid as f32 * height;
                points.push(x);
                points.push(y);
                walls.push(self.env.is_wall_at(x, y));
            }
        }

        let Some(values) = self.agent.value(&points, &goal) else {
            return Ok(());
        };

        let with_maze = render_value_heatmap(&values, grid, Some(&walls));
        write_ppm(
            &with_maze,
            &self
                .run_dir
                .join(format!("value_function_task_{task_id}_step_{step}.ppm")),
        )?;

        let without_maze = render_value_heatmap(&values, grid, None);
        write_ppm(
            &without_maze,
            &self.run_dir.join(format!(
                "value_function_task_{task_id}_no_obstacles_step_{step}.ppm"
            )),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::batch::Batch;
    use crate::rl::{AgentConfig, AgentName, TrainingBackend};
    use burn::backend::ndarray::NdArrayDevice;
    use tempfile::TempDir;

    fn options() -> EvalOptions {
        EvalOptions {
            eval_tasks: None,
            eval_episodes: 2,
            eval_temperature: 0.0,
            eval_gaussian: None,
            video_episodes: 1,
            video_frame_skip: 3,
            plot_value_function: false,
            value_grid_size: 20,
        }
    }

    fn example_batch() -> Batch {
        Batch {
            size: 1,
            obs_dim: 2,
            action_dim: 2,
            observations: vec![0.5; 2],
            next_observations: vec![0.6; 2],
            actions: vec![0.1; 2],
            goals: vec![1.5; 2],
            rewards: vec![0.0],
            masks: vec![1.0],
            speed: None,
            obstacles: None,
            speed_obstacles: None,
        }
    }

    fn create_agent(name: AgentName) -> Agent<TrainingBackend> {
        let device = NdArrayDevice::default();
        let config = AgentConfig {
            agent_name: name,
            hidden_dim: 16,
            ..Default::default()
        };
        Agent::create(0, &example_batch(), config, &device).unwrap()
    }

    #[test]
    fn test_run_produces_per_task_and_overall_metrics() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let agent = create_agent(AgentName::Gciql);
        let dir = TempDir::new().unwrap();
        let opts = options();

        let metrics = EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir.path(),
        }
        .run(1)
        .unwrap();

        for task in 1..=5 {
            assert!(metrics.contains_key(&format!("evaluation/task{task}_success")));
        }
        let overall = metrics["evaluation/overall_success"].as_scalar().unwrap();
        assert!((0.0..=1.0).contains(&overall));
        assert!(metrics.contains_key("video"));
    }

    #[test]
    fn test_overall_success_is_mean_of_task_rates() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let agent = create_agent(AgentName::Gcbc);
        let dir = TempDir::new().unwrap();
        let opts = options();

        let metrics = EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir.path(),
        }
        .run(1)
        .unwrap();

        let mean: f64 = (1..=5)
            .map(|t| {
                metrics[&format!("evaluation/task{t}_success")]
                    .as_scalar()
                    .unwrap()
            })
            .sum::<f64>()
            / 5.0;
        let overall = metrics["evaluation/overall_success"].as_scalar().unwrap();
        assert!((overall - mean).abs() < 1e-6);
    }

    #[test]
    fn test_eval_tasks_cap_respected() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let agent = create_agent(AgentName::Gcbc);
        let dir = TempDir::new().unwrap();
        let mut opts = options();
        opts.eval_tasks = Some(2);
        opts.video_episodes = 0;

        let metrics = EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir.path(),
        }
        .run(1)
        .unwrap();

        assert!(metrics.contains_key("evaluation/task2_success"));
        assert!(!metrics.contains_key("evaluation/task3_success"));
        assert!(!metrics.contains_key("video"));
    }

    #[test]
    fn test_value_plots_written_for_value_agent_only() {
        let dir = TempDir::new().unwrap();
        let mut opts = options();
        opts.plot_value_function = true;
        opts.eval_tasks = Some(1);
        opts.video_episodes = 0;

        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let agent = create_agent(AgentName::Gciql);
        EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir.path(),
        }
        .run(7)
        .unwrap();
        assert!(dir.path().join("value_function_task_1_step_7.ppm").exists());
        assert!(dir
            .path()
            .join("value_function_task_1_no_obstacles_step_7.ppm")
            .exists());

        // Policy-only agent: no plots, no error.
        let dir2 = TempDir::new().unwrap();
        let agent = create_agent(AgentName::Gcbc);
        EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir2.path(),
        }
        .run(7)
        .unwrap();
        assert!(!dir2.path().join("value_function_task_1_step_7.ppm").exists());
    }

    #[test]
    fn test_video_has_one_column_per_task() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let agent = create_agent(AgentName::Gcbc);
        let dir = TempDir::new().unwrap();
        let mut opts = options();
        opts.eval_tasks = Some(3);
        opts.eval_episodes = 1;

        let metrics = EvaluationRunner {
            agent: &agent,
            env: &mut env,
            conditioner: None,
            options: &opts,
            run_dir: dir.path(),
        }
        .run(1)
        .unwrap();

        let MetricValue::Video(video) = &metrics["video"] else {
            panic!("video metric missing");
        };
        let frame_width = env.render().width;
        assert_eq!(video.width, frame_width * 3);
    }
}
