//! 2-D point maze environment
//!
//! Wraps a wall-grid layout and provides the RL interface used by both
//! dataset collection and evaluation:
//! - Continuous observations: the agent's `[x, y]` position
//! - Continuous actions: per-axis velocity commands in [-1, 1]
//! - Goal-reaching tasks with a binary success signal
//!
//! World coordinates place cell (row, col) at `[col + 0.5, row + 0.5]`
//! scaled by the maze unit.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;

use crate::render::Frame;
use crate::rl::ConfigurationError;

/// Side length of one maze cell in world units
pub const MAZE_UNIT: f32 = 1.0;

const WALL_COLOR: [u8; 3] = [48, 48, 48];
const FLOOR_COLOR: [u8; 3] = [236, 236, 236];
const GOAL_COLOR: [u8; 3] = [46, 160, 67];
const AGENT_COLOR: [u8; 3] = [205, 49, 49];

const MEDIUM_LAYOUT: &str = "\
########
#      #
# ## # #
# #  # #
# # ## #
#   #  #
# #    #
########";

const LARGE_LAYOUT: &str = "\
############
#    #     #
# ## # ### #
# #      # #
# # #### # #
# # #  # # #
# #    # # #
# ###### # #
#          #
############";

/// One evaluation task: a named start/goal pair
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_name: String,
    pub start: [f32; 2],
    pub goal: [f32; 2],
}

/// Result of stepping the environment
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    pub observation: [f32; 2],
    pub reward: f32,
    pub terminated: bool,
    pub success: bool,
}

/// Wall grid parsed from an ASCII layout
#[derive(Debug, Clone)]
struct MazeLayout {
    width: usize,
    height: usize,
    walls: Vec<bool>,
}

impl MazeLayout {
    fn parse(text: &str) -> Self {
        let rows: Vec<&str> = text.lines().collect();
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut walls = vec![true; width * height];
        for (r, row) in rows.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                walls[r * width + c] = ch == '#';
            }
        }
        Self {
            width,
            height,
            walls,
        }
    }

    fn is_wall_cell(&self, row: usize, col: usize) -> bool {
        if row >= self.height || col >= self.width {
            return true;
        }
        self.walls[row * self.width + col]
    }
}

/// Point maze environment with goal-reaching tasks
#[derive(Debug)]
pub struct MazeEnv {
    name: String,
    layout: MazeLayout,
    tasks: Vec<TaskInfo>,
    free_cells: Vec<(usize, usize)>,
    max_steps: usize,
    goal_radius: f32,
    step_size: f32,
    pixels_per_cell: usize,
    position: [f32; 2],
    goal: [f32; 2],
    steps: usize,
}

impl MazeEnv {
    /// Create an environment by name
    ///
    /// Recognized names: `pointmaze-medium-navigate`,
    /// `pointmaze-large-navigate`. Anything else is a fatal
    /// configuration error.
    pub fn new(name: &str) -> Result<Self, ConfigurationError> {
        let (layout_text, max_steps, task_cells) = match name {
            "pointmaze-medium-navigate" => (
                MEDIUM_LAYOUT,
                200,
                vec![
                    ((1, 1), (6, 6)),
                    ((6, 1), (1, 6)),
                    ((1, 6), (6, 1)),
                    ((6, 6), (1, 1)),
                    ((1, 1), (5, 5)),
                ],
            ),
            "pointmaze-large-navigate" => (
                LARGE_LAYOUT,
                400,
                vec![
                    ((1, 1), (8, 10)),
                    ((8, 1), (1, 10)),
                    ((1, 10), (8, 1)),
                    ((8, 10), (1, 1)),
                    ((1, 1), (6, 6)),
                ],
            ),
            other => return Err(ConfigurationError::UnknownEnvironment(other.to_string())),
        };

        let layout = MazeLayout::parse(layout_text);
        let tasks = task_cells
            .iter()
            .enumerate()
            .map(|(i, &(start, goal))| TaskInfo {
                task_name: format!("task{}", i + 1),
                start: cell_center(start),
                goal: cell_center(goal),
            })
            .collect();

        let mut free_cells = Vec::new();
        for r in 0..layout.height {
            for c in 0..layout.width {
                if !layout.is_wall_cell(r, c) {
                    free_cells.push((r, c));
                }
            }
        }

        let start = cell_center(task_cells[0].0);
        let goal = cell_center(task_cells[0].1);
        Ok(Self {
            name: name.to_string(),
            layout,
            tasks,
            free_cells,
            max_steps,
            goal_radius: 0.5 * MAZE_UNIT,
            step_size: 0.25 * MAZE_UNIT,
            pixels_per_cell: 8,
            position: start,
            goal,
            steps: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluation tasks exposed by this environment (1-based task ids
    /// index into this list)
    pub fn task_infos(&self) -> &[TaskInfo] {
        &self.tasks
    }

    pub fn maze_unit(&self) -> f32 {
        MAZE_UNIT
    }

    pub fn observation_dim(&self) -> usize {
        2
    }

    pub fn action_dim(&self) -> usize {
        2
    }

    pub fn goal_radius(&self) -> f32 {
        self.goal_radius
    }

    /// World-space extent: `(width, height)` in world units
    pub fn bounds(&self) -> (f32, f32) {
        (
            self.layout.width as f32 * MAZE_UNIT,
            self.layout.height as f32 * MAZE_UNIT,
        )
    }

    pub fn position(&self) -> [f32; 2] {
        self.position
    }

    pub fn goal(&self) -> [f32; 2] {
        self.goal
    }

    /// Whether the world-space point sits inside a wall (points outside
    /// the layout count as walls)
    pub fn is_wall_at(&self, x: f32, y: f32) -> bool {
        if x < 0.0 || y < 0.0 {
            return true;
        }
        let col = (x / MAZE_UNIT) as usize;
        let row = (y / MAZE_UNIT) as usize;
        self.layout.is_wall_cell(row, col)
    }

    /// Grid cell containing the world-space point
    pub fn cell_of(&self, point: [f32; 2]) -> (usize, usize) {
        (
            (point[1] / MAZE_UNIT) as usize,
            (point[0] / MAZE_UNIT) as usize,
        )
    }

    /// Reset to a random free start cell with a random free goal cell
    pub fn reset(&mut self, rng: &mut StdRng) -> [f32; 2] {
        let start = self.free_cells[rng.gen_range(0..self.free_cells.len())];
        let goal = self.free_cells[rng.gen_range(0..self.free_cells.len())];
        self.position = cell_center(start);
        self.goal = cell_center(goal);
        self.steps = 0;
        self.position
    }

    /// Reset to the start of the given 1-based task
    ///
    /// Returns the initial observation and the task goal. An out-of-range
    /// task id is an error; evaluation aborts on it rather than skipping.
    pub fn reset_to_task(&mut self, task_id: usize) -> Result<([f32; 2], [f32; 2])> {
        if task_id == 0 || task_id > self.tasks.len() {
            bail!(
                "task id {} out of range (environment has {} tasks)",
                task_id,
                self.tasks.len()
            );
        }
        let task = &self.tasks[task_id - 1];
        self.position = task.start;
        self.goal = task.goal;
        self.steps = 0;
        Ok((self.position, self.goal))
    }

    /// Step with a per-axis velocity command in [-1, 1]
    ///
    /// Motion is resolved axis-wise: a move into a wall on one axis
    /// blocks only that axis. Reward is the binary success indicator.
    pub fn step(&mut self, action: &[f32]) -> StepResult {
        let dx = action.first().copied().unwrap_or(0.0).clamp(-1.0, 1.0) * self.step_size;
        let dy = action.get(1).copied().unwrap_or(0.0).clamp(-1.0, 1.0) * self.step_size;

        let nx = self.position[0] + dx;
        if !self.is_wall_at(nx, self.position[1]) {
            self.position[0] = nx;
        }
        let ny = self.position[1] + dy;
        if !self.is_wall_at(self.position[0], ny) {
            self.position[1] = ny;
        }

        self.steps += 1;
        let success = distance(self.position, self.goal) <= self.goal_radius;
        StepResult {
            observation: self.position,
            reward: if success { 1.0 } else { 0.0 },
            terminated: success || self.steps >= self.max_steps,
            success,
        }
    }

    /// Shortest cell path between two free cells (BFS), inclusive of both
    /// endpoints; `None` when unreachable
    pub fn shortest_path(
        &self,
        from: (usize, usize),
        to: (usize, usize),
    ) -> Option<Vec<(usize, usize)>> {
        if self.layout.is_wall_cell(from.0, from.1) || self.layout.is_wall_cell(to.0, to.1) {
            return None;
        }
        let width = self.layout.width;
        let mut parent = vec![usize::MAX; width * self.layout.height];
        let mut queue = VecDeque::new();
        parent[from.0 * width + from.1] = from.0 * width + from.1;
        queue.push_back(from);

        while let Some((r, c)) = queue.pop_front() {
            if (r, c) == to {
                let mut path = vec![(r, c)];
                let mut idx = r * width + c;
                while parent[idx] != idx {
                    idx = parent[idx];
                    path.push((idx / width, idx % width));
                }
                path.reverse();
                return Some(path);
            }
            for (nr, nc) in [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ] {
                if !self.layout.is_wall_cell(nr, nc) && parent[nr * width + nc] == usize::MAX {
                    parent[nr * width + nc] = r * width + c;
                    queue.push_back((nr, nc));
                }
            }
        }
        None
    }

    /// Render the current state as an RGB frame
    pub fn render(&self) -> Frame {
        let ppc = self.pixels_per_cell;
        let mut frame = Frame::filled(self.layout.width * ppc, self.layout.height * ppc, FLOOR_COLOR);
        for r in 0..self.layout.height {
            for c in 0..self.layout.width {
                if self.layout.is_wall_cell(r, c) {
                    frame.fill_rect(c * ppc, r * ppc, ppc, ppc, WALL_COLOR);
                }
            }
        }
        self.draw_marker(&mut frame, self.goal, GOAL_COLOR);
        self.draw_marker(&mut frame, self.position, AGENT_COLOR);
        frame
    }

    fn draw_marker(&self, frame: &mut Frame, point: [f32; 2], color: [u8; 3]) {
        let ppc = self.pixels_per_cell as f32;
        let px = (point[0] / MAZE_UNIT * ppc) as usize;
        let py = (point[1] / MAZE_UNIT * ppc) as usize;
        let half = self.pixels_per_cell / 4;
        frame.fill_rect(
            px.saturating_sub(half),
            py.saturating_sub(half),
            2 * half,
            2 * half,
            color,
        );
    }
}

/// World-space center of a grid cell
pub fn cell_center((row, col): (usize, usize)) -> [f32; 2] {
    [
        (col as f32 + 0.5) * MAZE_UNIT,
        (row as f32 + 0.5) * MAZE_UNIT,
    ]
}

fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_unknown_environment_rejected() {
        let err = MazeEnv::new("antfarm-v0").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEnvironment(_)));
    }

    #[test]
    fn test_environment_creation() {
        let env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        assert_eq!(env.observation_dim(), 2);
        assert_eq!(env.action_dim(), 2);
        assert_eq!(env.task_infos().len(), 5);
    }

    #[test]
    fn test_all_tasks_are_reachable() {
        for name in ["pointmaze-medium-navigate", "pointmaze-large-navigate"] {
            let env = MazeEnv::new(name).unwrap();
            for task in env.task_infos() {
                let from = env.cell_of(task.start);
                let to = env.cell_of(task.goal);
                assert!(
                    env.shortest_path(from, to).is_some(),
                    "{}: {} has unreachable goal",
                    name,
                    task.task_name
                );
            }
        }
    }

    #[test]
    fn test_reset_to_task_sets_start_and_goal() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let (obs, goal) = env.reset_to_task(1).unwrap();
        assert_eq!(obs, env.task_infos()[0].start);
        assert_eq!(goal, env.task_infos()[0].goal);
    }

    #[test]
    fn test_reset_to_invalid_task_fails() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        assert!(env.reset_to_task(0).is_err());
        assert!(env.reset_to_task(99).is_err());
    }

    #[test]
    fn test_walls_block_motion() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        env.reset_to_task(1).unwrap();
        // Drive hard into the left outer wall; x should never go below the
        // wall boundary.
        for _ in 0..20 {
            env.step(&[-1.0, 0.0]);
        }
        assert!(env.position()[0] >= MAZE_UNIT);
        assert!(!env.is_wall_at(env.position()[0], env.position()[1]));
    }

    #[test]
    fn test_step_reports_success_at_goal() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        env.reset_to_task(1).unwrap();
        env.goal = env.position;
        let result = env.step(&[0.0, 0.0]);
        assert!(result.success);
        assert!(result.terminated);
        assert_eq!(result.reward, 1.0);
    }

    #[test]
    fn test_episode_caps_at_max_steps() {
        let mut env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        env.reset_to_task(1).unwrap();
        let mut terminated = false;
        let mut steps = 0;
        while !terminated {
            terminated = env.step(&[0.0, 0.0]).terminated;
            steps += 1;
            assert!(steps <= 200, "episode failed to terminate");
        }
        assert_eq!(steps, 200);
    }

    #[test]
    fn test_random_reset_lands_on_free_cells() {
        let mut env = MazeEnv::new("pointmaze-large-navigate").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let obs = env.reset(&mut rng);
            assert!(!env.is_wall_at(obs[0], obs[1]));
            let goal = env.goal();
            assert!(!env.is_wall_at(goal[0], goal[1]));
        }
    }

    #[test]
    fn test_render_dimensions() {
        let env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        let frame = env.render();
        assert_eq!(frame.width, 8 * 8);
        assert_eq!(frame.height, 8 * 8);
        assert_eq!(frame.rgb.len(), frame.width * frame.height * 3);
    }
}
