//! Obstacle-aware speed conditioning
//!
//! Maps distance-to-nearest-obstacle to a normalized speed scalar in
//! `[speed_min, 1.0]` under one of three profiles. The linear profile
//! ramps up linearly with distance; the exponential profile stays near
//! `speed_min` longer, producing sharper braking close to obstacles; the
//! constant profile ignores distances entirely.
//!
//! Both distance-based profiles saturate at exactly 1.0 once the
//! distance reaches the falloff radius.

use crate::env::ObstacleSet;
use crate::rl::SpeedProfile;

/// Default minimum-speed floor for the distance-based profiles
pub const DEFAULT_SPEED_MIN: f32 = 0.1;

/// Fixed floor used by the constant profile
pub const CONSTANT_SPEED_MIN: f32 = 0.1;

/// Distance at which both distance-based profiles reach full speed, in
/// world units
pub const FALLOFF_RADIUS: f32 = 1.0;

fn linear_speed(distance: f32, speed_min: f32) -> f32 {
    let speed = speed_min + (1.0 - speed_min) * distance / FALLOFF_RADIUS;
    speed.clamp(speed_min, 1.0)
}

fn exponential_speed(distance: f32, speed_min: f32) -> f32 {
    let rate = (1.0 / speed_min).ln() / FALLOFF_RADIUS;
    let speed = speed_min * (rate * distance).exp();
    speed.clamp(speed_min, 1.0)
}

/// Samples per-observation speed scalars from a fixed obstacle set
///
/// Constructed once at startup from the configured profile; the same
/// instance conditions the offline dataset and, at evaluation time, the
/// live observations fed to the agent.
#[derive(Debug, Clone)]
pub struct SpeedConditioner {
    profile: SpeedProfile,
    speed_min: f32,
    obstacles: ObstacleSet,
}

impl SpeedConditioner {
    /// Create a conditioner with the given minimum-speed floor
    ///
    /// The constant profile overrides the floor with its fixed value.
    pub fn new(profile: SpeedProfile, obstacles: ObstacleSet, speed_min: f32) -> Self {
        let speed_min = match profile {
            SpeedProfile::Constant => CONSTANT_SPEED_MIN,
            _ => speed_min,
        };
        Self {
            profile,
            speed_min,
            obstacles,
        }
    }

    /// The floor in effect for this profile
    pub fn speed_min(&self) -> f32 {
        self.speed_min
    }

    pub fn profile(&self) -> SpeedProfile {
        self.profile
    }

    /// Speed scalar for a single observation
    pub fn speed_at(&self, point: &[f32]) -> f32 {
        match self.profile {
            SpeedProfile::Constant => 1.0,
            SpeedProfile::Linear => {
                linear_speed(self.obstacles.nearest_distance(point), self.speed_min)
            }
            SpeedProfile::Exponential => {
                exponential_speed(self.obstacles.nearest_distance(point), self.speed_min)
            }
        }
    }

    /// Speed scalars for a flat array of observations, one per row
    pub fn speeds(&self, observations: &[f32], dim: usize) -> Vec<f32> {
        observations
            .chunks_exact(dim)
            .map(|point| self.speed_at(point))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MazeEnv;

    fn obstacle_set() -> ObstacleSet {
        let env = MazeEnv::new("pointmaze-medium-navigate").unwrap();
        ObstacleSet::generate(&env, 0.1)
    }

    fn conditioner(profile: SpeedProfile) -> SpeedConditioner {
        SpeedConditioner::new(profile, obstacle_set(), DEFAULT_SPEED_MIN)
    }

    #[test]
    fn test_constant_profile_returns_ones() {
        let c = conditioner(SpeedProfile::Constant);
        let observations = [1.5, 1.5, 4.5, 4.5, 0.5, 0.5];
        let speeds = c.speeds(&observations, 2);
        assert_eq!(speeds, vec![1.0, 1.0, 1.0]);
        assert_eq!(c.speed_min(), CONSTANT_SPEED_MIN);
    }

    #[test]
    fn test_speeds_stay_in_range() {
        for profile in [SpeedProfile::Linear, SpeedProfile::Exponential] {
            let c = conditioner(profile);
            for y in 0..80 {
                for x in 0..80 {
                    let point = [x as f32 * 0.1, y as f32 * 0.1];
                    let speed = c.speed_at(&point);
                    assert!(
                        (c.speed_min()..=1.0).contains(&speed),
                        "{:?} out of range at {:?}: {}",
                        profile,
                        point,
                        speed
                    );
                }
            }
        }
    }

    #[test]
    fn test_full_speed_beyond_falloff_radius() {
        let set = obstacle_set();
        for profile in [SpeedProfile::Linear, SpeedProfile::Exponential] {
            let c = SpeedConditioner::new(profile, set.clone(), DEFAULT_SPEED_MIN);
            for y in 0..80 {
                for x in 0..80 {
                    let point = [x as f32 * 0.1, y as f32 * 0.1];
                    if set.nearest_distance(&point) > FALLOFF_RADIUS {
                        assert_eq!(c.speed_at(&point), 1.0, "{:?} at {:?}", profile, point);
                    }
                }
            }
        }
    }

    #[test]
    fn test_speed_min_at_obstacle() {
        // A point inside a wall has distance ~0 to the set.
        for profile in [SpeedProfile::Linear, SpeedProfile::Exponential] {
            let c = conditioner(profile);
            let speed = c.speed_at(&[0.05, 0.05]);
            assert!(speed <= c.speed_min() + 0.05, "{:?}: {}", profile, speed);
        }
    }

    #[test]
    fn test_exponential_brakes_harder_than_linear() {
        let set = obstacle_set();
        let linear = SpeedConditioner::new(SpeedProfile::Linear, set.clone(), DEFAULT_SPEED_MIN);
        let exponential =
            SpeedConditioner::new(SpeedProfile::Exponential, set, DEFAULT_SPEED_MIN);
        let mut checked = 0;
        for y in 0..80 {
            for x in 0..80 {
                let point = [x as f32 * 0.1, y as f32 * 0.1];
                let ls = linear.speed_at(&point);
                let es = exponential.speed_at(&point);
                if ls > linear.speed_min() && ls < 1.0 {
                    assert!(es <= ls + 1e-6, "exponential above linear at {:?}", point);
                    checked += 1;
                }
            }
        }
        assert!(checked > 0, "no mid-range points exercised");
    }

    #[test]
    fn test_speeds_length_matches_input() {
        let c = conditioner(SpeedProfile::Linear);
        let observations: Vec<f32> = (0..34).map(|i| i as f32 * 0.2).collect();
        let speeds = c.speeds(&observations, 2);
        assert_eq!(speeds.len(), 17);
    }
}
