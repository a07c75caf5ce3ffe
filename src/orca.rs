//! Construction of the ORCA half-planes of a 2D agent.
//!
//! Every neighbor contributes at most one half-plane of permitted
//! velocities. Obstacle half-planes always come first so the optimizer can
//! treat them as hard constraints.

use log::trace;
use ndarray::{arr1, Array1};

use crate::{
    agent::{Agent, AgentId},
    error::Result,
    geometry::tangent_legs,
    halfplane::Halfplane,
    math::{abs_sq, cross, norm, normalize, perp, sqr, EPSILON},
    obstacle::ObstacleMap,
    registry::AgentRegistry,
};

/// Something an agent has to avoid during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Neighbor {
    Agent(AgentId),
    /// Obstacle edge starting at the given processed vertex.
    ObstacleSegment(usize),
}

impl Neighbor {
    fn is_obstacle(&self) -> bool {
        matches!(self, Neighbor::ObstacleSegment(_))
    }
}

/// Half-planes of one agent, obstacle half-planes first.
#[derive(Debug, Clone, Default)]
pub(crate) struct Constraints {
    pub halfplanes: Vec<Halfplane>,
    pub obstacle_count: usize,
}

/// Builds the half-planes of `agent` against its neighbors.
pub(crate) fn build_constraints(
    agent: &Agent,
    neighbors: &[Neighbor],
    agents: &AgentRegistry,
    obstacles: &ObstacleMap,
    time_step: f64,
) -> Result<Constraints> {
    let ordered = neighbors
        .iter()
        .filter(|neighbor| neighbor.is_obstacle())
        .chain(neighbors.iter().filter(|neighbor| !neighbor.is_obstacle()));

    let mut constraints = Constraints::default();
    for neighbor in ordered {
        let halfplane = match *neighbor {
            Neighbor::ObstacleSegment(vertex) => {
                let halfplane = obstacle_halfplane(agent, obstacles, vertex, &constraints.halfplanes);
                if halfplane.is_some() {
                    constraints.obstacle_count += 1;
                }
                halfplane
            }
            Neighbor::Agent(id) => Some(agent_halfplane(agent, agents.get(id)?, time_step)),
        };
        constraints.halfplanes.extend(halfplane);
    }

    trace!(
        "agent {}: {} obstacle and {} agent half-planes",
        agent.id,
        constraints.obstacle_count,
        constraints.halfplanes.len() - constraints.obstacle_count
    );
    Ok(constraints)
}

/// Reciprocal half-plane of `agent` against another agent. The share of the
/// avoidance effort follows the avoidance weights of both.
fn agent_halfplane(agent: &Agent, other: &Agent, time_step: f64) -> Halfplane {
    let relative_position = &other.position - &agent.position;
    let relative_velocity = &agent.velocity - &other.velocity;
    let dist_sq = abs_sq(&relative_position);
    let combined_radius = agent.params.radius + other.params.radius;
    let combined_radius_sq = sqr(combined_radius);
    let inv_time_horizon = 1.0 / agent.params.time_horizon;

    let (direction, u) = if dist_sq > combined_radius_sq {
        // vector from the cutoff center to the relative velocity
        let w = &relative_velocity - &(&relative_position * inv_time_horizon);
        let w_length_sq = abs_sq(&w);
        let dot_product = w.dot(&relative_position);

        if dot_product < 0.0 && sqr(dot_product) > combined_radius_sq * w_length_sq {
            // closest to the cutoff circle
            let w_length = w_length_sq.sqrt();
            let unit_w = &w / w_length;
            let direction = arr1(&[unit_w[1], -unit_w[0]]);
            (direction, unit_w * (combined_radius * inv_time_horizon - w_length))
        } else {
            // closest to one of the legs
            let (left_leg, right_leg) = tangent_legs(&relative_position, combined_radius);
            let direction = if cross(&relative_position, &w) > 0.0 {
                left_leg
            } else {
                -right_leg
            };
            let u = &direction * relative_velocity.dot(&direction) - &relative_velocity;
            (direction, u)
        }
    } else {
        // already overlapping, separate within one time step
        let inv_time_step = 1.0 / time_step;
        let w = &relative_velocity - &(&relative_position * inv_time_step);
        let w_length = norm(&w);
        let unit_w = if w_length > EPSILON {
            &w / w_length
        } else {
            separation_direction(agent, other, &relative_position)
        };
        let direction = arr1(&[unit_w[1], -unit_w[0]]);
        (direction, unit_w * (combined_radius * inv_time_step - w_length))
    };

    let point = &agent.velocity + &(&u * agent.responsibility(other));
    Halfplane::new(point, direction)
}

/// Direction in which the relative velocity is pushed when it sits exactly on
/// the cutoff center. Coincident agents are separated along the x axis, the
/// lower id moving towards positive x.
fn separation_direction(agent: &Agent, other: &Agent, relative_position: &Array1<f64>) -> Array1<f64> {
    if abs_sq(relative_position) > sqr(EPSILON) {
        return -normalize(relative_position);
    }
    if agent.id < other.id {
        arr1(&[1.0, 0.0])
    } else {
        arr1(&[-1.0, 0.0])
    }
}

/// Half-plane of `agent` against the obstacle edge starting at `vertex`, or
/// `None` if `existing` half-planes already cover the edge or a neighboring
/// edge takes care of it.
fn obstacle_halfplane(
    agent: &Agent,
    obstacles: &ObstacleMap,
    vertex: usize,
    existing: &[Halfplane],
) -> Option<Halfplane> {
    let radius = agent.params.radius;
    let inv_time_horizon_obst = 1.0 / agent.params.time_horizon_obst;
    let velocity = &agent.velocity;

    let mut obstacle1 = obstacles.vertex(vertex);
    let mut obstacle2 = obstacles.vertex(obstacle1.next);

    let relative_position1 = &obstacle1.point - &agent.position;
    let relative_position2 = &obstacle2.point - &agent.position;

    let already_covered = existing.iter().any(|halfplane| {
        let covers = |relative_position: &Array1<f64>| {
            cross(
                &(relative_position * inv_time_horizon_obst - &halfplane.point),
                &halfplane.direction,
            ) - inv_time_horizon_obst * radius
                >= -EPSILON
        };
        covers(&relative_position1) && covers(&relative_position2)
    });
    if already_covered {
        return None;
    }

    let dist_sq1 = abs_sq(&relative_position1);
    let dist_sq2 = abs_sq(&relative_position2);
    let radius_sq = sqr(radius);

    let obstacle_vector = &obstacle2.point - &obstacle1.point;
    let s = (-&relative_position1).dot(&obstacle_vector) / abs_sq(&obstacle_vector);
    let dist_sq_line = abs_sq(&(-&relative_position1 - &obstacle_vector * s));

    // overlapping the obstacle: only velocities leading away are allowed
    if s < 0.0 && dist_sq1 <= radius_sq {
        if !obstacle1.convex {
            return None;
        }
        return Some(Halfplane::new(
            Array1::zeros(2),
            normalize(&arr1(&[-relative_position1[1], relative_position1[0]])),
        ));
    }
    if s > 1.0 && dist_sq2 <= radius_sq {
        // the right vertex is handled as the left vertex of the next edge
        // unless that edge bends away
        if !obstacle2.convex || cross(&relative_position2, &obstacle2.unit_dir) < 0.0 {
            return None;
        }
        return Some(Halfplane::new(
            Array1::zeros(2),
            normalize(&arr1(&[-relative_position2[1], relative_position2[0]])),
        ));
    }
    if (0.0..=1.0).contains(&s) && dist_sq_line <= radius_sq {
        return Some(Halfplane::new(Array1::zeros(2), -&obstacle1.unit_dir));
    }

    // no collision: the velocity obstacle is bounded by two legs and a
    // cutoff segment between the scaled vertices
    let (mut left_leg, mut right_leg) = if s < 0.0 && dist_sq_line <= radius_sq {
        // seen obliquely so that only the left vertex matters
        if !obstacle1.convex {
            return None;
        }
        obstacle2 = obstacle1;
        tangent_legs(&relative_position1, radius)
    } else if s > 1.0 && dist_sq_line <= radius_sq {
        // seen obliquely so that only the right vertex matters
        if !obstacle2.convex {
            return None;
        }
        obstacle1 = obstacle2;
        tangent_legs(&relative_position2, radius)
    } else {
        let left_leg = if obstacle1.convex {
            tangent_legs(&relative_position1, radius).0
        } else {
            -&obstacle1.unit_dir
        };
        let right_leg = if obstacle2.convex {
            tangent_legs(&relative_position2, radius).1
        } else {
            obstacle1.unit_dir.clone()
        };
        (left_leg, right_leg)
    };

    // a leg pointing into the neighboring edge is replaced by that edge
    let left_neighbor = obstacles.vertex(obstacle1.prev);
    let mut left_leg_foreign = false;
    let mut right_leg_foreign = false;
    if obstacle1.convex && cross(&left_leg, &(-&left_neighbor.unit_dir)) >= 0.0 {
        left_leg = -&left_neighbor.unit_dir;
        left_leg_foreign = true;
    }
    if obstacle2.convex && cross(&right_leg, &obstacle2.unit_dir) <= 0.0 {
        right_leg = obstacle2.unit_dir.clone();
        right_leg_foreign = true;
    }

    let left_cutoff = (&obstacle1.point - &agent.position) * inv_time_horizon_obst;
    let right_cutoff = (&obstacle2.point - &agent.position) * inv_time_horizon_obst;
    let cutoff_vector = &right_cutoff - &left_cutoff;
    let same_vertex = obstacle1.id == obstacle2.id;
    let scaled_radius = radius * inv_time_horizon_obst;

    let t = if same_vertex {
        0.5
    } else {
        (velocity - &left_cutoff).dot(&cutoff_vector) / abs_sq(&cutoff_vector)
    };
    let t_left = (velocity - &left_cutoff).dot(&left_leg);
    let t_right = (velocity - &right_cutoff).dot(&right_leg);

    if (t < 0.0 && t_left < 0.0) || (same_vertex && t_left < 0.0 && t_right < 0.0) {
        // closest to the left cutoff circle
        let unit_w = cutoff_direction(velocity, &left_cutoff);
        return Some(Halfplane::new(
            &left_cutoff + &(&unit_w * scaled_radius),
            arr1(&[unit_w[1], -unit_w[0]]),
        ));
    }
    if t > 1.0 && t_right < 0.0 {
        // closest to the right cutoff circle
        let unit_w = cutoff_direction(velocity, &right_cutoff);
        return Some(Halfplane::new(
            &right_cutoff + &(&unit_w * scaled_radius),
            arr1(&[unit_w[1], -unit_w[0]]),
        ));
    }

    let dist_sq_cutoff = if t < 0.0 || t > 1.0 || same_vertex {
        f64::INFINITY
    } else {
        abs_sq(&(velocity - &(&left_cutoff + &(&cutoff_vector * t))))
    };
    let dist_sq_left = if t_left < 0.0 {
        f64::INFINITY
    } else {
        abs_sq(&(velocity - &(&left_cutoff + &(&left_leg * t_left))))
    };
    let dist_sq_right = if t_right < 0.0 {
        f64::INFINITY
    } else {
        abs_sq(&(velocity - &(&right_cutoff + &(&right_leg * t_right))))
    };

    if dist_sq_cutoff <= dist_sq_left && dist_sq_cutoff <= dist_sq_right {
        // closest to the cutoff segment
        let direction = -&obstacle1.unit_dir;
        let point = &left_cutoff + &(perp(&direction) * scaled_radius);
        return Some(Halfplane::new(point, direction));
    }
    if dist_sq_left <= dist_sq_right {
        // closest to the left leg
        if left_leg_foreign {
            return None;
        }
        let point = &left_cutoff + &(perp(&left_leg) * scaled_radius);
        return Some(Halfplane::new(point, left_leg));
    }
    // closest to the right leg
    if right_leg_foreign {
        return None;
    }
    let direction = -right_leg;
    let point = &right_cutoff + &(perp(&direction) * scaled_radius);
    Some(Halfplane::new(point, direction))
}

/// Unit vector from a cutoff center towards `velocity`. A velocity right on
/// the center is pushed back towards the agent.
fn cutoff_direction(velocity: &Array1<f64>, cutoff: &Array1<f64>) -> Array1<f64> {
    let w = velocity - cutoff;
    if abs_sq(&w) > sqr(EPSILON) {
        normalize(&w)
    } else {
        normalize(&(-cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AgentParams, Relaxation},
        optimizer::optimize,
    };
    use approx::assert_abs_diff_eq;

    fn pair(
        position: Array1<f64>,
        velocity: Array1<f64>,
        other_position: Array1<f64>,
        other_velocity: Array1<f64>,
    ) -> (AgentRegistry, AgentId, AgentId) {
        let params = AgentParams::default()
            .with_radius(0.5)
            .with_time_horizons(2.0, 2.0);
        let mut registry = AgentRegistry::new(2);
        let a = registry.add(position, params.clone()).unwrap();
        let b = registry.add(other_position, params).unwrap();
        registry.get_mut(a).unwrap().velocity = velocity;
        registry.get_mut(b).unwrap().velocity = other_velocity;
        (registry, a, b)
    }

    fn constraints_of(registry: &AgentRegistry, id: AgentId, other: AgentId) -> Constraints {
        build_constraints(
            registry.get(id).unwrap(),
            &[Neighbor::Agent(other)],
            registry,
            &ObstacleMap::default(),
            0.1,
        )
        .unwrap()
    }

    #[test]
    fn test_head_on_agents_must_deviate() {
        let (registry, a, b) = pair(
            arr1(&[0.0, 0.0]),
            arr1(&[1.0, 0.0]),
            arr1(&[4.0, 0.0]),
            arr1(&[-1.0, 0.0]),
        );
        let constraints = constraints_of(&registry, a, b);
        assert_eq!(constraints.halfplanes.len(), 1);
        assert_eq!(constraints.obstacle_count, 0);

        let halfplane = &constraints.halfplanes[0];
        // the current velocity leads into a collision within the horizon
        assert!(!halfplane.contains(&arr1(&[1.0, 0.0])));
        // sidestepping to the right is fine
        assert!(halfplane.contains(&arr1(&[0.5, -1.0])));
    }

    #[test]
    fn test_separating_agents_keep_their_velocity() {
        let (registry, a, b) = pair(
            arr1(&[0.0, 0.0]),
            arr1(&[-1.0, 0.0]),
            arr1(&[4.0, 0.0]),
            arr1(&[1.0, 0.0]),
        );
        let halfplane = &constraints_of(&registry, a, b).halfplanes[0];
        assert!(halfplane.contains(&arr1(&[-1.0, 0.0])));
    }

    #[test]
    fn test_half_planes_are_reciprocal() {
        let (registry, a, b) = pair(
            arr1(&[0.0, 0.0]),
            arr1(&[1.0, 0.2]),
            arr1(&[3.0, 0.5]),
            arr1(&[-1.0, 0.0]),
        );
        let plane_a = &constraints_of(&registry, a, b).halfplanes[0];
        let plane_b = &constraints_of(&registry, b, a).halfplanes[0];

        // mirrored boundaries: opposite directions, offsets of equal size
        assert_abs_diff_eq!(plane_a.direction[0], -plane_b.direction[0], epsilon = 1e-12);
        assert_abs_diff_eq!(plane_a.direction[1], -plane_b.direction[1], epsilon = 1e-12);
        let shift_a = &plane_a.point - &registry.get(a).unwrap().velocity;
        let shift_b = &plane_b.point - &registry.get(b).unwrap().velocity;
        assert_abs_diff_eq!(shift_a[0], -shift_b[0], epsilon = 1e-12);
        assert_abs_diff_eq!(shift_a[1], -shift_b[1], epsilon = 1e-12);
    }

    #[test]
    fn test_overlapping_agents_are_pushed_apart() {
        let (registry, a, b) = pair(
            arr1(&[0.0, 0.0]),
            arr1(&[0.0, 0.0]),
            arr1(&[0.5, 0.0]),
            arr1(&[0.0, 0.0]),
        );
        let halfplane = &constraints_of(&registry, a, b).halfplanes[0];
        assert!(!halfplane.contains(&arr1(&[0.0, 0.0])));
        assert!(halfplane.contains(&arr1(&[-5.0, 0.0])));
    }

    #[test]
    fn test_coincident_agents_split_by_id() {
        let (registry, a, b) = pair(
            arr1(&[1.0, 1.0]),
            arr1(&[0.0, 0.0]),
            arr1(&[1.0, 1.0]),
            arr1(&[0.0, 0.0]),
        );
        let plane_a = &constraints_of(&registry, a, b).halfplanes[0];
        let plane_b = &constraints_of(&registry, b, a).halfplanes[0];
        assert!(plane_a.point.iter().all(|c| c.is_finite()));
        assert!(plane_a.contains(&arr1(&[10.0, 0.0])));
        assert!(plane_b.contains(&arr1(&[-10.0, 0.0])));
    }

    fn square() -> Vec<Array1<f64>> {
        vec![
            arr1(&[-1.0, -1.0]),
            arr1(&[1.0, -1.0]),
            arr1(&[1.0, 1.0]),
            arr1(&[-1.0, 1.0]),
        ]
    }

    fn obstacle_constraints(obstacles: &ObstacleMap, agent: &Agent) -> Constraints {
        let neighbors: Vec<Neighbor> = obstacles
            .query(&agent.position, agent.obstacle_range())
            .iter()
            .map(|neighbor| Neighbor::ObstacleSegment(neighbor.vertex))
            .collect();
        build_constraints(agent, &neighbors, &AgentRegistry::new(2), obstacles, 0.1).unwrap()
    }

    #[test]
    fn test_convex_corner_leaves_escape_open() {
        let mut obstacles = ObstacleMap::default();
        obstacles.add_chain(square()).unwrap();
        obstacles.process();

        let params = AgentParams::default()
            .with_radius(0.5)
            .with_max_speed(2.0)
            .with_time_horizons(2.0, 2.0);
        let agent = Agent::new(AgentId(0), arr1(&[2.0, 2.0]), params);
        let constraints = obstacle_constraints(&obstacles, &agent);

        // both visible edges end in the same corner, one half-plane suffices
        assert_eq!(constraints.halfplanes.len(), 1);
        assert_eq!(constraints.obstacle_count, 1);

        let away = arr1(&[1.0, 1.0]);
        for halfplane in &constraints.halfplanes {
            assert!(halfplane.contains(&away));
        }

        let chosen = optimize(
            &constraints.halfplanes,
            constraints.obstacle_count,
            2.0,
            &away,
            Relaxation::default(),
        );
        assert_abs_diff_eq!(chosen[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(chosen[1], 1.0, epsilon = 1e-9);

        // heading into the corner is slowed down to a safe speed
        let into = optimize(
            &constraints.halfplanes,
            constraints.obstacle_count,
            2.0,
            &arr1(&[-2.0, -2.0]),
            Relaxation::default(),
        );
        assert!(constraints.halfplanes[0].violation(&into) <= 1e-9);
        assert!(norm(&into) < norm(&arr1(&[-2.0, -2.0])));
    }

    #[test]
    fn test_wall_blocks_approach() {
        let mut obstacles = ObstacleMap::default();
        obstacles
            .add_chain(vec![
                arr1(&[-5.0, 0.0]),
                arr1(&[5.0, 0.0]),
                arr1(&[5.0, 1.0]),
                arr1(&[-5.0, 1.0]),
            ])
            .unwrap();
        obstacles.process();

        let params = AgentParams::default()
            .with_radius(0.2)
            .with_max_speed(2.0)
            .with_time_horizons(2.0, 2.0);
        let agent = Agent::new(AgentId(0), arr1(&[0.0, -0.5]), params);
        let constraints = obstacle_constraints(&obstacles, &agent);
        assert!(constraints.obstacle_count >= 1);

        let chosen = optimize(
            &constraints.halfplanes,
            constraints.obstacle_count,
            2.0,
            &arr1(&[0.0, 2.0]),
            Relaxation::default(),
        );
        // the gap of 0.3 may only be closed over the whole horizon of 2
        assert!(chosen[1] <= 0.15 + 1e-9);
    }

    #[test]
    fn test_agent_touching_edge_is_pushed_out() {
        let mut obstacles = ObstacleMap::default();
        obstacles.add_chain(square()).unwrap();
        obstacles.process();

        let params = AgentParams::default().with_radius(0.5);
        let agent = Agent::new(AgentId(0), arr1(&[0.0, -1.2]), params);
        let constraints = obstacle_constraints(&obstacles, &agent);
        assert!(constraints.obstacle_count >= 1);
        let halfplane = &constraints.halfplanes[0];
        assert!(halfplane.point.iter().all(|c| *c == 0.0));
        assert!(halfplane.contains(&arr1(&[0.0, -1.0])));
        assert!(!halfplane.contains(&arr1(&[0.0, 1.0])));
    }
}
