//! The 2D simulator: agents, obstacle polygons and the step loop.

use std::collections::HashMap;

use log::{debug, trace};
use ndarray::Array1;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    agent::{Agent, AgentId},
    config::{positive, AgentParams, SimulatorConfig},
    error::{Error, Result},
    halfplane::Halfplane,
    kdtree::AgentTree,
    obstacle::{ObstacleId, ObstacleMap},
    optimizer::optimize,
    orca::{build_constraints, Neighbor},
    registry::{check_vector, AgentRegistry},
};

/// What an agent saw and decided on during the last step.
#[derive(Debug, Clone, Default)]
struct StepReport {
    agent_neighbors: Vec<AgentId>,
    obstacle_neighbors: Vec<(Array1<f64>, Array1<f64>)>,
    halfplanes: Vec<Halfplane>,
}

struct Plan {
    id: AgentId,
    velocity: Array1<f64>,
    report: StepReport,
}

/// Simulates circular agents in the plane that avoid each other and static
/// polygonal obstacles.
///
/// Each step the caller sets the preferred velocities, calls
/// [`Simulator::do_step`] and reads back the new velocities and positions.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
    agents: AgentRegistry,
    obstacles: ObstacleMap,
    global_time: f64,
    reports: HashMap<AgentId, StepReport>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        debug!("creating 2D simulator with {:?}", config);
        Ok(Simulator {
            config,
            agents: AgentRegistry::new(2),
            obstacles: ObstacleMap::default(),
            global_time: 0.0,
            reports: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Adds an agent with the configured default parameters.
    pub fn add_agent(&mut self, position: Array1<f64>) -> Result<AgentId> {
        let params = self.config.agent_defaults.clone();
        self.agents.add(position, params)
    }

    pub fn add_agent_with(&mut self, position: Array1<f64>, params: AgentParams) -> Result<AgentId> {
        self.agents.add(position, params)
    }

    /// Removes an agent. Its handle stays invalid for the lifetime of the
    /// simulator.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<()> {
        self.agents.remove(id)?;
        self.reports.remove(&id);
        Ok(())
    }

    /// Parameters for agents added from now on with [`Simulator::add_agent`].
    pub fn set_agent_defaults(&mut self, params: AgentParams) -> Result<()> {
        params.validate()?;
        self.config.agent_defaults = params;
        Ok(())
    }

    /// Registers a closed obstacle polygon. Vertices in counter-clockwise
    /// order keep agents out, clockwise order keeps them in. Two vertices
    /// form a wall that blocks from both sides. Takes effect after
    /// [`Simulator::process_obstacles`].
    pub fn add_obstacle(&mut self, vertices: Vec<Array1<f64>>) -> Result<ObstacleId> {
        self.obstacles.add_chain(vertices)
    }

    /// Prepares all registered obstacles for queries. Required after adding
    /// obstacles and before the next step.
    pub fn process_obstacles(&mut self) {
        self.obstacles.process();
    }

    pub fn obstacle_vertices(&self, id: ObstacleId) -> Result<&[Array1<f64>]> {
        self.obstacles.chain(id)
    }

    pub fn num_obstacles(&self) -> usize {
        self.obstacles.len()
    }

    /// Whether an agent of `radius` could move in a straight line from
    /// `from` to `to` without hitting an obstacle.
    pub fn query_visibility(&self, from: &Array1<f64>, to: &Array1<f64>, radius: f64) -> Result<bool> {
        if !self.obstacles.is_processed() {
            return Err(Error::ObstaclesNotProcessed);
        }
        check_vector(2, "from", from)?;
        check_vector(2, "to", to)?;
        Ok(self.obstacles.is_visible(from, to, radius))
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

    /// Half-planes the agent had to respect in the last step, obstacle
    /// half-planes first. Empty before the first step.
    pub fn agent_orca_lines(&self, id: AgentId) -> Result<&[Halfplane]> {
        self.agents.get(id)?;
        Ok(self
            .reports
            .get(&id)
            .map(|report| report.halfplanes.as_slice())
            .unwrap_or_default())
    }

    /// Agents considered in the last step, nearest first.
    pub fn agent_neighbors(&self, id: AgentId) -> Result<&[AgentId]> {
        self.agents.get(id)?;
        Ok(self
            .reports
            .get(&id)
            .map(|report| report.agent_neighbors.as_slice())
            .unwrap_or_default())
    }

    /// Obstacle edges considered in the last step as pairs of end points,
    /// nearest first.
    pub fn agent_obstacle_neighbors(&self, id: AgentId) -> Result<&[(Array1<f64>, Array1<f64>)]> {
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

    /// Simulated time that has passed over all steps so far.
    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    /// Advances the simulation by one time step.
    ///
    /// New velocities of all agents are computed from the same snapshot of
    /// positions and velocities; only then are they committed and the
    /// positions advanced.
    pub fn do_step(&mut self) -> Result<()> {
        if !self.obstacles.is_processed() {
            return Err(Error::ObstaclesNotProcessed);
        }
        debug!(
            "step at t={} with {} agents",
            self.global_time,
            self.agents.len()
        );

        let tree = AgentTree::build(&self.agents);
        let plans = self.plan_all(&tree)?;

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

    fn plan_all(&self, tree: &AgentTree) -> Result<Vec<Plan>> {
        let agents: Vec<&Agent> = self.agents.iter().collect();

        #[cfg(feature = "parallel")]
        let plans = agents
            .par_iter()
            .map(|agent| self.plan(agent, tree))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let plans = agents.iter().map(|agent| self.plan(agent, tree)).collect();

        plans
    }

    fn plan(&self, agent: &Agent, tree: &AgentTree) -> Result<Plan> {
        let params = &agent.params;
        let obstacle_neighbors = self
            .obstacles
            .query(&agent.position, agent.obstacle_range());
        let agent_neighbors = tree.query(
            &agent.position,
            params.neighbor_dist,
            params.max_neighbors,
            agent.id,
        );

        let neighbors: Vec<Neighbor> = obstacle_neighbors
            .iter()
            .map(|neighbor| Neighbor::ObstacleSegment(neighbor.vertex))
            .chain(agent_neighbors.iter().map(|neighbor| Neighbor::Agent(neighbor.id)))
            .collect();
        let constraints = build_constraints(
            agent,
            &neighbors,
            &self.agents,
            &self.obstacles,
            self.config.time_step,
        )?;
        let velocity = optimize(
            &constraints.halfplanes,
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
                obstacle_neighbors: obstacle_neighbors
                    .iter()
                    .map(|neighbor| {
                        let first = self.obstacles.vertex(neighbor.vertex);
                        (
                            first.point.clone(),
                            self.obstacles.vertex(first.next).point.clone(),
                        )
                    })
                    .collect(),
                halfplanes: constraints.halfplanes,
            },
        })
    }
}
