use std::fmt;

use ndarray::Array1;

use crate::config::AgentParams;

/// Stable handle of an agent. Handles are never reused within a simulator,
/// even after the agent was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub(crate) usize);

impl AgentId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one simulated agent.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
    /// Set by the caller before each step.
    pub pref_velocity: Array1<f64>,
    pub params: AgentParams,
}

impl Agent {
    pub(crate) fn new(id: AgentId, position: Array1<f64>, params: AgentParams) -> Self {
        let dimension = position.len();
        Agent {
            id,
            position,
            velocity: Array1::zeros(dimension),
            pref_velocity: Array1::zeros(dimension),
            params,
        }
    }

    /// Share of the avoidance effort this agent takes on against `other`.
    pub(crate) fn responsibility(&self, other: &Agent) -> f64 {
        let total = self.params.avoidance_weight + other.params.avoidance_weight;
        if total <= 0.0 {
            return 0.5;
        }
        self.params.avoidance_weight / total
    }

    /// Search radius for obstacle edges that can be reached within the
    /// obstacle time horizon.
    pub(crate) fn obstacle_range(&self) -> f64 {
        self.params.time_horizon_obst * self.params.max_speed + self.params.radius
    }

    /// Moves the agent along its committed velocity.
    pub(crate) fn advance(&mut self, time_step: f64) {
        self.position = &self.position + &(&self.velocity * time_step);
    }
}
