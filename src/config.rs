//! Simulator and per-agent tunables.

use crate::error::{Error, Result};

/// What the optimizer gives up when an agent's constraints cannot all be met.
///
/// Obstacle constraints are always kept as long as they are satisfiable on
/// their own; the policies only differ in how agent constraints are relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Relaxation {
    /// Keep the optimum of the longest satisfiable prefix of the constraint
    /// list and drop everything after it. Agent constraints are ordered by
    /// distance, so the farthest neighbors are dropped first.
    #[default]
    DropTrailing,
    /// Minimize the largest penetration of any agent constraint, the way
    /// RVO2 relaxes.
    MinimizePenetration,
}

/// Parameters of a single agent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentParams {
    pub radius: f64,
    pub max_speed: f64,
    /// Maximum center distance at which other agents are taken into account.
    pub neighbor_dist: f64,
    pub max_neighbors: usize,
    /// Look-ahead for agent-agent avoidance.
    pub time_horizon: f64,
    /// Look-ahead for agent-obstacle avoidance.
    pub time_horizon_obst: f64,
    /// Relative share of the avoidance effort. Two agents with equal weights
    /// split it evenly; an agent with weight 0 leaves it all to the other one.
    pub avoidance_weight: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        AgentParams {
            radius: 1.5,
            max_speed: 2.0,
            neighbor_dist: 15.0,
            max_neighbors: 10,
            time_horizon: 10.0,
            time_horizon_obst: 10.0,
            avoidance_weight: 1.0,
        }
    }
}

impl AgentParams {
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_neighbors(mut self, neighbor_dist: f64, max_neighbors: usize) -> Self {
        self.neighbor_dist = neighbor_dist;
        self.max_neighbors = max_neighbors;
        self
    }

    pub fn with_time_horizons(mut self, time_horizon: f64, time_horizon_obst: f64) -> Self {
        self.time_horizon = time_horizon;
        self.time_horizon_obst = time_horizon_obst;
        self
    }

    pub fn with_avoidance_weight(mut self, avoidance_weight: f64) -> Self {
        self.avoidance_weight = avoidance_weight;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("radius", self.radius)?;
        non_negative("max_speed", self.max_speed)?;
        non_negative("neighbor_dist", self.neighbor_dist)?;
        positive("time_horizon", self.time_horizon)?;
        positive("time_horizon_obst", self.time_horizon_obst)?;
        non_negative("avoidance_weight", self.avoidance_weight)?;
        Ok(())
    }
}

/// Global simulator settings. `agent_defaults` applies to every agent added
/// without explicit parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulatorConfig {
    pub time_step: f64,
    pub agent_defaults: AgentParams,
    pub relaxation: Relaxation,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            time_step: 0.25,
            agent_defaults: AgentParams::default(),
            relaxation: Relaxation::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn new(
        time_step: f64,
        neighbor_dist: f64,
        max_neighbors: usize,
        time_horizon: f64,
        time_horizon_obst: f64,
        radius: f64,
        max_speed: f64,
    ) -> Self {
        SimulatorConfig {
            time_step,
            agent_defaults: AgentParams {
                radius,
                max_speed,
                neighbor_dist,
                max_neighbors,
                time_horizon,
                time_horizon_obst,
                avoidance_weight: 1.0,
            },
            relaxation: Relaxation::default(),
        }
    }

    pub fn with_relaxation(mut self, relaxation: Relaxation) -> Self {
        self.relaxation = relaxation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("time_step", self.time_step)?;
        self.agent_defaults.validate()
    }
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::NonFinite { name });
    }
    if value <= 0.0 {
        return Err(Error::InvalidParameter { name, value });
    }
    Ok(())
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::NonFinite { name });
    }
    if value < 0.0 {
        return Err(Error::InvalidParameter { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_constructor() {
        let config = SimulatorConfig::new(1.0 / 30.0, 1.5, 5, 1.5, 2.0, 0.4, 2.0);
        assert_eq!(config.agent_defaults.max_neighbors, 5);
        assert_eq!(config.agent_defaults.time_horizon_obst, 2.0);
        assert_eq!(config.relaxation, Relaxation::DropTrailing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let config = SimulatorConfig::new(0.0, 1.5, 5, 1.5, 2.0, 0.4, 2.0);
        assert_eq!(
            config.validate(),
            Err(Error::InvalidParameter {
                name: "time_step",
                value: 0.0
            })
        );

        let params = AgentParams::default().with_radius(-1.0);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { name: "radius", .. })
        ));

        let params = AgentParams::default().with_max_speed(f64::NAN);
        assert_eq!(params.validate(), Err(Error::NonFinite { name: "max_speed" }));
    }
}
