use log::debug;
use ndarray::Array1;

use crate::{
    agent::{Agent, AgentId},
    config::AgentParams,
    error::{Error, Result},
    math::is_finite,
};

/// Arena of agents addressed by [`AgentId`]. Removed agents leave an empty
/// slot behind so that handles stay unique.
#[derive(Debug, Clone)]
pub(crate) struct AgentRegistry {
    dimension: usize,
    slots: Vec<Option<Agent>>,
}

impl AgentRegistry {
    pub fn new(dimension: usize) -> Self {
        AgentRegistry {
            dimension,
            slots: Vec::new(),
        }
    }

    /// Checks that `vector` has the registry's dimension and finite
    /// components.
    pub fn check_vector(&self, name: &'static str, vector: &Array1<f64>) -> Result<()> {
        check_vector(self.dimension, name, vector)
    }

    pub fn add(&mut self, position: Array1<f64>, params: AgentParams) -> Result<AgentId> {
        self.check_vector("position", &position)?;
        params.validate()?;
        let id = AgentId(self.slots.len());
        debug!("adding agent {} at {:?}", id, position);
        self.slots.push(Some(Agent::new(id, position, params)));
        Ok(id)
    }

    pub fn remove(&mut self, id: AgentId) -> Result<Agent> {
        let agent = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(invalid(id))?;
        debug!("removed agent {}", id);
        Ok(agent)
    }

    pub fn get(&self, id: AgentId) -> Result<&Agent> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(invalid(id))
    }

    pub fn get_mut(&mut self, id: AgentId) -> Result<&mut Agent> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(invalid(id))
    }

    /// Mutates the parameters of an agent, rejecting the change if the
    /// result is invalid.
    pub fn update_params<F>(&mut self, id: AgentId, update: F) -> Result<()>
    where
        F: FnOnce(&mut AgentParams),
    {
        let agent = self.get_mut(id)?;
        let mut params = agent.params.clone();
        update(&mut params);
        params.validate()?;
        agent.params = params;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.slots.iter_mut().flatten()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.iter().map(|agent| agent.id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }
}

pub(crate) fn check_vector(dimension: usize, name: &'static str, vector: &Array1<f64>) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            found: vector.len(),
        });
    }
    if !is_finite(vector) {
        return Err(Error::NonFinite { name });
    }
    Ok(())
}

fn invalid(id: AgentId) -> Error {
    Error::InvalidIdentifier {
        kind: "agent",
        index: id.0,
    }
}
