//! Multi-agent collision avoidance with optimal reciprocal collision
//! avoidance (ORCA).
//!
//! Agents are discs in 2D ([`Simulator`]) or spheres in 3D
//! ([`Simulator3d`]). Every step each agent picks the velocity closest to its
//! preferred velocity that keeps it clear of its neighbors and of static
//! obstacles for a configurable time horizon, assuming that the neighbors do
//! their share of the avoidance.
//!
//! ```
//! use orca_sim::{ndarray::arr1, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(0.25, 15.0, 10, 5.0, 5.0, 0.5, 2.0);
//! let mut sim = Simulator::new(config)?;
//! let a = sim.add_agent(arr1(&[-5.0, 0.0]))?;
//! let b = sim.add_agent(arr1(&[5.0, 0.1]))?;
//! sim.add_obstacle(vec![
//!     arr1(&[-1.0, 3.0]),
//!     arr1(&[1.0, 3.0]),
//!     arr1(&[1.0, 4.0]),
//!     arr1(&[-1.0, 4.0]),
//! ])?;
//! sim.process_obstacles();
//!
//! for _ in 0..100 {
//!     let goal_a = arr1(&[5.0, 0.0]) - sim.agent_position(a)?;
//!     let goal_b = arr1(&[-5.0, 0.0]) - sim.agent_position(b)?;
//!     sim.set_agent_pref_velocity(a, goal_a)?;
//!     sim.set_agent_pref_velocity(b, goal_b)?;
//!     sim.do_step()?;
//! }
//! # Ok::<(), orca_sim::Error>(())
//! ```

mod agent;
mod config;
mod error;
mod geometry;
mod halfplane;
mod kdtree;
mod math;
mod obstacle;
mod obstacle3d;
mod optimizer;
mod optimizer3d;
mod orca;
mod orca3d;
mod registry;
mod simulator;
mod simulator3d;

pub use agent::{Agent, AgentId};
pub use config::{AgentParams, Relaxation, SimulatorConfig};
pub use error::{Error, Result};
pub use halfplane::{Halfplane, Halfspace};
pub use math::EPSILON;
pub use obstacle::ObstacleId;
pub use simulator::Simulator;
pub use simulator3d::Simulator3d;

pub use ndarray;
