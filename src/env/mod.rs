//! Environment, offline dataset, and obstacle scanning
//!
//! This module is the environment/dataset collaborator boundary: the
//! training loop only sees the reset/step/task-list contract, the dataset
//! sampling contract, and the immutable obstacle coordinate set.

pub mod dataset;
pub mod maze;
pub mod obstacles;

pub use dataset::{collect_dataset, Dataset, GoalDataset};
pub use maze::{MazeEnv, StepResult, TaskInfo, MAZE_UNIT};
pub use obstacles::ObstacleSet;
