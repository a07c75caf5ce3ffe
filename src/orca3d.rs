//! Construction of the ORCA half-spaces of a 3D agent.

use log::trace;
use ndarray::{arr1, Array1};

use crate::{
    agent::{Agent, AgentId},
    error::Result,
    halfplane::Halfspace,
    math::{abs_sq, cross3, norm, normalize, sqr, EPSILON},
    obstacle3d::FaceSet,
    registry::AgentRegistry,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Neighbor3d {
    Agent(AgentId),
    /// A face together with its point closest to the agent.
    Face { face: usize, closest: Array1<f64> },
}

/// Half-spaces of one agent, face half-spaces first.
#[derive(Debug, Clone, Default)]
pub(crate) struct Constraints3d {
    pub halfspaces: Vec<Halfspace>,
    pub obstacle_count: usize,
}

pub(crate) fn build_constraints(
    agent: &Agent,
    neighbors: &[Neighbor3d],
    agents: &AgentRegistry,
    faces: &FaceSet,
    time_step: f64,
) -> Result<Constraints3d> {
    let mut constraints = Constraints3d::default();

    for neighbor in neighbors {
        if let Neighbor3d::Face { face, closest } = neighbor {
            constraints
                .halfspaces
                .push(face_halfspace(agent, closest, faces.normal(*face), time_step));
            constraints.obstacle_count += 1;
        }
    }
    for neighbor in neighbors {
        if let Neighbor3d::Agent(id) = neighbor {
            let other = agents.get(*id)?;
            constraints
                .halfspaces
                .push(agent_halfspace(agent, other, time_step));
        }
    }

    trace!(
        "agent {}: {} face and {} agent half-spaces",
        agent.id,
        constraints.obstacle_count,
        constraints.halfspaces.len() - constraints.obstacle_count
    );
    Ok(constraints)
}

/// Normal of the boundary plane and the smallest change `u` of the relative
/// velocity that leaves the truncated velocity obstacle.
struct Avoidance {
    normal: Array1<f64>,
    u: Array1<f64>,
}

/// Velocity obstacle of a sphere of `combined_radius` at `relative_position`
/// truncated at `1 / inv_time_horizon`. `fallback` is the push direction for
/// overlapping spheres whose relative velocity gives none.
fn avoidance(
    relative_position: &Array1<f64>,
    relative_velocity: &Array1<f64>,
    combined_radius: f64,
    inv_time_horizon: f64,
    inv_time_step: f64,
    fallback: Array1<f64>,
) -> Avoidance {
    let dist_sq = abs_sq(relative_position);
    let combined_radius_sq = sqr(combined_radius);

    if dist_sq > combined_radius_sq {
        let w = relative_velocity - &(relative_position * inv_time_horizon);
        let w_length_sq = abs_sq(&w);
        let dot_product = w.dot(relative_position);

        if dot_product < 0.0 && sqr(dot_product) > combined_radius_sq * w_length_sq {
            // closest to the cutoff sphere
            let w_length = w_length_sq.sqrt();
            let unit_w = &w / w_length;
            let u = &unit_w * (combined_radius * inv_time_horizon - w_length);
            return Avoidance { normal: unit_w, u };
        }

        // closest to the cone
        let a = dist_sq;
        let b = relative_position.dot(relative_velocity);
        let c = abs_sq(relative_velocity)
            - abs_sq(&cross3(relative_position, relative_velocity))
                / (dist_sq - combined_radius_sq);
        let t = (b + (sqr(b) - a * c).max(0.0).sqrt()) / a;
        let w = relative_velocity - &(relative_position * t);
        let w_length = norm(&w);
        // on the axis of the cone every sideways direction is equally close
        let unit_w = if w_length > EPSILON {
            &w / w_length
        } else {
            perpendicular(relative_position)
        };
        let u = &unit_w * (combined_radius * t - w_length);
        return Avoidance { normal: unit_w, u };
    }

    // overlapping, separate within one time step
    let w = relative_velocity - &(relative_position * inv_time_step);
    let w_length = norm(&w);
    let unit_w = if w_length > EPSILON { &w / w_length } else { fallback };
    let u = &unit_w * (combined_radius * inv_time_step - w_length);
    Avoidance { normal: unit_w, u }
}

/// Unit vector perpendicular to `vector`. Negating `vector` negates the
/// result.
fn perpendicular(vector: &Array1<f64>) -> Array1<f64> {
    let axis = (0..3)
        .min_by(|&a, &b| vector[a].abs().total_cmp(&vector[b].abs()))
        .unwrap_or(0);
    let mut unit = Array1::zeros(3);
    unit[axis] = 1.0;
    normalize(&cross3(vector, &unit))
}

fn agent_halfspace(agent: &Agent, other: &Agent, time_step: f64) -> Halfspace {
    let relative_position = &other.position - &agent.position;
    let fallback = if abs_sq(&relative_position) > sqr(EPSILON) {
        -normalize(&relative_position)
    } else if agent.id < other.id {
        arr1(&[1.0, 0.0, 0.0])
    } else {
        arr1(&[-1.0, 0.0, 0.0])
    };

    let Avoidance { normal, u } = avoidance(
        &relative_position,
        &(&agent.velocity - &other.velocity),
        agent.params.radius + other.params.radius,
        1.0 / agent.params.time_horizon,
        1.0 / time_step,
        fallback,
    );
    Halfspace::new(&agent.velocity + &(&u * agent.responsibility(other)), normal)
}

/// Faces are static and take no part in the avoidance, so the agent carries
/// all of it.
fn face_halfspace(
    agent: &Agent,
    closest: &Array1<f64>,
    face_normal: &Array1<f64>,
    time_step: f64,
) -> Halfspace {
    let relative_position = closest - &agent.position;
    let fallback = if abs_sq(&relative_position) > sqr(EPSILON) {
        -normalize(&relative_position)
    } else if (&agent.position - closest).dot(face_normal) >= 0.0 {
        face_normal.clone()
    } else {
        -face_normal
    };

    let Avoidance { normal, u } = avoidance(
        &relative_position,
        &agent.velocity,
        agent.params.radius,
        1.0 / agent.params.time_horizon_obst,
        1.0 / time_step,
        fallback,
    );
    Halfspace::new(&agent.velocity + &u, normal)
}
