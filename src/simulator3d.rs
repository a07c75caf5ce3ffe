//! The 3D simulator: spherical agents and convex planar faces.

use std::collections::HashMap;

use log::{debug, trace};
use ndarray::Array1;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    agent::{Agent, AgentId},
    config::{positive, AgentParams, SimulatorConfig},
    error::{Error, Result},
    halfplane::Halfspace,
    kdtree::AgentTree,
    obstacle::ObstacleId,
    obstacle3d::FaceSet,
    optimizer3d::optimize,
    orca3d::{build_constraints, Neighbor3d},
    registry::AgentRegistry,
};

#[derive(Debug, Clone, Default)]
struct StepReport {
    agent_neighbors: Vec<AgentId>,
    obstacle_neighbors: Vec<ObstacleId>,
    halfspaces: Vec<Halfspace>,
}

struct Plan {
    id: AgentId,
    velocity: Array1<f64>,
    report: StepReport,
}

/// Simulates spherical agents in space that avoid each other and static
/// convex faces. Used like [`crate::Simulator`].
#[derive(Debug, Clone)]
pub struct Simulator3d {
    config: SimulatorConfig,
    agents: AgentRegistry,
    faces: FaceSet,
    global_time: f64,
    reports: HashMap<AgentId, StepReport>,
}

impl Simulator3d {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        debug!("creating 3D simulator with {:?}", config);
        Ok(Simulator3d {
            config,
            agents: AgentRegistry::new(3),
            faces: FaceSet::default(),
            global_time: 0.0,
            reports: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn add_agent(&mut self, position: Array1<f64>) -> Result<AgentId> {
        let params = self.config.agent_defaults.clone();
        self.agents.add(position, params)
    }

    pub fn add_agent_with(&mut self, position: Array1<f64>, params: AgentParams) -> Result<AgentId> {
        self.agents.add(position, params)
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Result<()> {
        self.agents.remove(id)?;
        self.reports.remove(&id);
        Ok(())
    }

    pub fn set_agent_defaults(&mut self, params: AgentParams) -> Result<()> {
        params.validate()?;
        self.config.agent_defaults = params;
        Ok(())
    }

    /// Registers a convex planar face. Agents are kept away from both of its
    /// sides. Takes effect after [`Simulator3d::process_obstacles`].
    pub fn add_obstacle(&mut self, vertices: Vec<Array1<f64>>) -> Result<ObstacleId> {
        self.faces.add_face(vertices)
    }

    pub fn process_obstacles(&mut self) {
        self.faces.process();
    }

    pub fn obstacle_vertices(&self, id: ObstacleId) -> Result<&[Array1<f64>]> {
        self.faces.face(id)
    }

    pub fn num_obstacles(&self) -> usize {
        self.faces.len()
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.ids()
    }

    pub fn agent(&self, id: AgentId) -> Result<&Agent> {
        self.agents.get(id)
    }

    pub fn agent_position(&self, id: AgentId) -> Result<&Array1<f64>> {
        Ok(&self.agents.get(id)?.position)
    }

    pub fn set_agent_position(&mut self, id: AgentId, position: Array1<f64>) -> Result<()> {
        self.agents.check_vector("position", &position)?;
        self.agents.get_mut(id)?.position = position;
        Ok(())
    }

    pub fn agent_velocity(&self, id: AgentId) -> Result<&Array1<f64>> {
        Ok(&self.agents.get(id)?.velocity)
    }

    pub fn set_agent_velocity(&mut self, id: AgentId, velocity: Array1<f64>) -> Result<()> {
        self.agents.check_vector("velocity", &velocity)?;
        self.agents.get_mut(id)?.velocity = velocity;
        Ok(())
    }

    pub fn agent_pref_velocity(&self, id: AgentId) -> Result<&Array1<f64>> {
        Ok(&self.agents.get(id)?.pref_velocity)
    }

    pub fn set_agent_pref_velocity(&mut self, id: AgentId, pref_velocity: Array1<f64>) -> Result<()> {
        self.agents.check_vector("pref_velocity", &pref_velocity)?;
        self.agents.get_mut(id)?.pref_velocity = pref_velocity;
        Ok(())
    }

    pub fn agent_params(&self, id: AgentId) -> Result<&AgentParams> {
        Ok(&self.agents.get(id)?.params)
    }

    pub fn set_agent_params(&mut self, id: AgentId, params: AgentParams) -> Result<()> {
        self.agents.update_params(id, |current| *current = params)
    }

    pub fn set_agent_radius(&mut self, id: AgentId, radius: f64) -> Result<()> {
        self.agents.update_params(id, |params| params.radius = radius)
    }

    pub fn set_agent_max_speed(&mut self, id: AgentId, max_speed: f64) -> Result<()> {
        self.agents.update_params(id, |params| params.max_speed = max_speed)
    }

    pub fn set_agent_neighbor_dist(&mut self, id: AgentId, neighbor_dist: f64) -> Result<()> {
        self.agents
            .update_params(id, |params| params.neighbor_dist = neighbor_dist)
    }

    pub fn set_agent_max_neighbors(&mut self, id: AgentId, max_neighbors: usize) -> Result<()> {
        self.agents
            .update_params(id, |params| params.max_neighbors = max_neighbors)
    }

    pub fn set_agent_time_horizon(&mut self, id: AgentId, time_horizon: f64) -> Result<()> {
        self.agents
            .update_params(id, |params| params.time_horizon = time_horizon)
    }

    pub fn set_agent_time_horizon_obst(&mut self, id: AgentId, time_horizon_obst: f64) -> Result<()> {
        self.agents
            .update_params(id, |params| params.time_horizon_obst = time_horizon_obst)
    }

    pub fn set_agent_avoidance_weight(&mut self, id: AgentId, avoidance_weight: f64) -> Result<()> {
        self.agents
            .update_params(id, |params| params.avoidance_weight = avoidance_weight)
    }

    /// Half-spaces the agent had to respect in the last step, face
    /// half-spaces first.
    pub fn agent_orca_planes(&self, id: AgentId) -> Result<&[Halfspace]> {
        self.agents.get(id)?;
        Ok(self
            .reports
            .get(&id)
            .map(|report| report.halfspaces.as_slice())
            .unwrap_or_default())
    }

    pub fn agent_neighbors(&self, id: AgentId) -> Result<&[AgentId]> {
        self.agents.get(id)?;
        Ok(self
            .reports
            .get(&id)
            .map(|report| report.agent_neighbors.as_slice())
            .unwrap_or_default())
    }

    pub fn agent_obstacle_neighbors(&self, id: AgentId) -> Result<&[ObstacleId]> {
        self.agents.get(id)?;
        Ok(self
            .reports
            .get(&id)
            .map(|report| report.obstacle_neighbors.as_slice())
            .unwrap_or_default())
    }

    pub fn time_step(&self) -> f64 {
        self.config.time_step
    }

    pub fn set_time_step(&mut self, time_step: f64) -> Result<()> {
        positive("time_step", time_step)?;
        self.config.time_step = time_step;
        Ok(())
    }

    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    /// Advances the simulation by one time step. See
    /// [`crate::Simulator::do_step`].
    pub fn do_step(&mut self) -> Result<()> {
        if !self.faces.is_processed() {
            return Err(Error::ObstaclesNotProcessed);
        }
        debug!(
            "step at t={} with {} agents",
            self.global_time,
            self.agents.len()
        );

        let tree = AgentTree::build(&self.agents);
        let agents: Vec<&Agent> = self.agents.iter().collect();
        #[cfg(feature = "parallel")]
        let plans: Vec<Plan> = agents
            .par_iter()
            .map(|agent| self.plan(agent, &tree))
            .collect::<Result<_>>()?;
        #[cfg(not(feature = "parallel"))]
        let plans: Vec<Plan> = agents
            .iter()
            .map(|agent| self.plan(agent, &tree))
            .collect::<Result<_>>()?;

        self.reports.clear();
        for plan in plans {
            self.agents.get_mut(plan.id)?.velocity = plan.velocity;
            self.reports.insert(plan.id, plan.report);
        }
        let time_step = self.config.time_step;
        for agent in self.agents.iter_mut() {
            agent.advance(time_step);
        }
        self.global_time += time_step;
        Ok(())
    }

    fn plan(&self, agent: &Agent, tree: &AgentTree) -> Result<Plan> {
        let params = &agent.params;
        let face_neighbors = self.faces.query(&agent.position, agent.obstacle_range());
        let agent_neighbors = tree.query(
            &agent.position,
            params.neighbor_dist,
            params.max_neighbors,
            agent.id,
        );

        let obstacle_ids = face_neighbors
            .iter()
            .map(|neighbor| ObstacleId(neighbor.face))
            .collect();
        let neighbors: Vec<Neighbor3d> = face_neighbors
            .into_iter()
            .map(|neighbor| Neighbor3d::Face {
                face: neighbor.face,
                closest: neighbor.closest,
            })
            .chain(agent_neighbors.iter().map(|neighbor| Neighbor3d::Agent(neighbor.id)))
            .collect();
        let constraints = build_constraints(
            agent,
            &neighbors,
            &self.agents,
            &self.faces,
            self.config.time_step,
        )?;
        let velocity = optimize(
            &constraints.halfspaces,
            constraints.obstacle_count,
            params.max_speed,
            &agent.pref_velocity,
            self.config.relaxation,
        );
        trace!("agent {} moves with {}", agent.id, velocity);

        Ok(Plan {
            id: agent.id,
            velocity,
            report: StepReport {
                agent_neighbors: agent_neighbors.iter().map(|neighbor| neighbor.id).collect(),
                obstacle_neighbors: obstacle_ids,
                halfspaces: constraints.halfspaces,
            },
        })
    }
}
