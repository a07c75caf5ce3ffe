//! Velocity selection in 2D: the velocity closest to the preferred one that
//! satisfies every half-plane constraint and the max speed disk, solved as an
//! incremental linear program.

use log::{trace, warn};
use ndarray::Array1;

use crate::{
    config::Relaxation,
    geometry::{clip_by_halfplanes, clip_line_to_ball},
    halfplane::Halfplane,
    math::{abs_sq, clamp_norm, cross, normalize, perp, sqr, EPSILON},
};

/// Best velocity for the given constraints. The first `obstacle_count`
/// constraints stem from obstacles and are only relaxed if they contradict
/// each other. Infeasibility never fails: the least violating velocity is
/// returned and its speed never exceeds `max_speed`.
pub fn optimize(
    halfplanes: &[Halfplane],
    obstacle_count: usize,
    max_speed: f64,
    pref_velocity: &Array1<f64>,
    relaxation: Relaxation,
) -> Array1<f64> {
    let (fail, mut velocity) = linear_program2(halfplanes, max_speed, pref_velocity, false);

    if fail < halfplanes.len() {
        trace!(
            "constraint {} of {} is infeasible, relaxing with {:?}",
            fail,
            halfplanes.len(),
            relaxation
        );
        if fail < obstacle_count {
            warn!("obstacle constraints contradict each other, minimizing their penetration");
            velocity = linear_program3(halfplanes, 0, fail, max_speed, velocity);
        } else {
            match relaxation {
                Relaxation::MinimizePenetration => {
                    velocity =
                        linear_program3(halfplanes, obstacle_count, fail, max_speed, velocity);
                }
                // linear_program2 already returns the optimum of the feasible prefix
                Relaxation::DropTrailing => {}
            }
        }
    }

    clamp_norm(&velocity, max_speed)
}

/// Optimizes along the boundary of `halfplanes[plane_no]` subject to the disk
/// and all earlier half-planes. `None` if that boundary has no feasible
/// point.
fn linear_program1(
    halfplanes: &[Halfplane],
    plane_no: usize,
    radius: f64,
    opt_velocity: &Array1<f64>,
    direction_opt: bool,
) -> Option<Array1<f64>> {
    let plane = &halfplanes[plane_no];
    let interval = clip_line_to_ball(&plane.point, &plane.direction, radius)?;
    let (t_left, t_right) = clip_by_halfplanes(plane, &halfplanes[..plane_no], interval)?;

    let at = |t: f64| &plane.point + &(&plane.direction * t);
    if direction_opt {
        let along = opt_velocity.dot(&plane.direction);
        if along.abs() <= EPSILON {
            // either end is equally good, prefer the slower one
            let (left, right) = (at(t_left), at(t_right));
            return Some(if abs_sq(&right) < abs_sq(&left) { right } else { left });
        }
        return Some(if along > 0.0 { at(t_right) } else { at(t_left) });
    }

    let t = plane.direction.dot(&(opt_velocity - &plane.point));
    Some(at(t.clamp(t_left, t_right)))
}

/// Incrementally adds the half-planes. Returns the number of half-planes
/// that could be satisfied together with the optimum over them.
fn linear_program2(
    halfplanes: &[Halfplane],
    radius: f64,
    opt_velocity: &Array1<f64>,
    direction_opt: bool,
) -> (usize, Array1<f64>) {
    let mut result = if direction_opt {
        // optimizing a direction, `opt_velocity` is a unit vector
        opt_velocity * radius
    } else if abs_sq(opt_velocity) > sqr(radius) {
        normalize(opt_velocity) * radius
    } else {
        opt_velocity.clone()
    };

    for (i, plane) in halfplanes.iter().enumerate() {
        if plane.violation(&result) > 0.0 {
            match linear_program1(halfplanes, i, radius, opt_velocity, direction_opt) {
                Some(velocity) => result = velocity,
                None => return (i, result),
            }
        }
    }

    (halfplanes.len(), result)
}

/// Minimizes the largest violation of `halfplanes[begin..]` while keeping
/// the first `hard_count` half-planes satisfied.
fn linear_program3(
    halfplanes: &[Halfplane],
    hard_count: usize,
    begin: usize,
    radius: f64,
    mut result: Array1<f64>,
) -> Array1<f64> {
    let mut distance = 0.0;

    for i in begin..halfplanes.len() {
        let plane = &halfplanes[i];
        if plane.violation(&result) <= distance {
            // the current result already violates this one by less
            continue;
        }

        let mut projected: Vec<Halfplane> = halfplanes[..hard_count].to_vec();
        for other in &halfplanes[hard_count..i] {
            let determinant = cross(&plane.direction, &other.direction);
            let point = if determinant.abs() <= EPSILON {
                if plane.direction.dot(&other.direction) > 0.0 {
                    // same direction, the bisector does not exist
                    continue;
                }
                (&plane.point + &other.point) * 0.5
            } else {
                let along = cross(&other.direction, &(&plane.point - &other.point)) / determinant;
                &plane.point + &(&plane.direction * along)
            };
            projected.push(Halfplane::new(
                point,
                normalize(&(&other.direction - &plane.direction)),
            ));
        }

        let (fail, candidate) = linear_program2(&projected, radius, &perp(&plane.direction), true);
        // a failure can only be caused by rounding, keep the previous result then
        if fail == projected.len() {
            result = candidate;
        }
        distance = plane.violation(&result);
    }

    result
}
