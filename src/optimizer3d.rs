//! Velocity selection in 3D over half-space constraints and the max speed
//! ball.

use log::{trace, warn};
use ndarray::Array1;

use crate::{
    config::Relaxation,
    halfplane::Halfspace,
    math::{abs_sq, clamp_norm, cross3, normalize, sqr, EPSILON},
};

/// A line in velocity space, the intersection of two boundary planes.
struct Line {
    point: Array1<f64>,
    direction: Array1<f64>,
}

/// 3D counterpart of [`crate::optimizer::optimize`].
pub fn optimize(
    halfspaces: &[Halfspace],
    obstacle_count: usize,
    max_speed: f64,
    pref_velocity: &Array1<f64>,
    relaxation: Relaxation,
) -> Array1<f64> {
    let (fail, mut velocity) = linear_program3(halfspaces, max_speed, pref_velocity, false);

    if fail < halfspaces.len() {
        trace!(
            "constraint {} of {} is infeasible, relaxing with {:?}",
            fail,
            halfspaces.len(),
            relaxation
        );
        if fail < obstacle_count {
            warn!("obstacle constraints contradict each other, minimizing their penetration");
            velocity = linear_program4(halfspaces, 0, fail, max_speed, velocity);
        } else if relaxation == Relaxation::MinimizePenetration {
            velocity = linear_program4(halfspaces, obstacle_count, fail, max_speed, velocity);
        }
    }

    clamp_norm(&velocity, max_speed)
}

/// Optimizes along `line` inside the ball and the first `plane_no`
/// half-spaces.
fn linear_program1(
    halfspaces: &[Halfspace],
    plane_no: usize,
    line: &Line,
    radius: f64,
    opt_velocity: &Array1<f64>,
    direction_opt: bool,
) -> Option<Array1<f64>> {
    let dot_product = line.point.dot(&line.direction);
    let discriminant = sqr(dot_product) + sqr(radius) - abs_sq(&line.point);
    if discriminant < 0.0 {
        // the line misses the ball
        return None;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot_product - sqrt_discriminant;
    let mut t_right = -dot_product + sqrt_discriminant;

    for halfspace in &halfspaces[..plane_no] {
        let numerator = (&halfspace.point - &line.point).dot(&halfspace.normal);
        let denominator = line.direction.dot(&halfspace.normal);

        if denominator.abs() <= EPSILON {
            // parallel to the plane
            if numerator > 0.0 {
                return None;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_left = t_left.max(t);
        } else {
            t_right = t_right.min(t);
        }
        if t_left > t_right {
            return None;
        }
    }

    let at = |t: f64| &line.point + &(&line.direction * t);
    if direction_opt {
        let along = opt_velocity.dot(&line.direction);
        if along.abs() <= EPSILON {
            let (left, right) = (at(t_left), at(t_right));
            return Some(if abs_sq(&right) < abs_sq(&left) { right } else { left });
        }
        return Some(if along > 0.0 { at(t_right) } else { at(t_left) });
    }

    let t = line.direction.dot(&(opt_velocity - &line.point));
    Some(at(t.clamp(t_left, t_right)))
}

/// Optimizes on the boundary of `halfspaces[plane_no]` inside the ball and
/// the earlier half-spaces.
fn linear_program2(
    halfspaces: &[Halfspace],
    plane_no: usize,
    radius: f64,
    opt_velocity: &Array1<f64>,
    direction_opt: bool,
) -> Option<Array1<f64>> {
    let plane = &halfspaces[plane_no];
    let plane_dist = plane.point.dot(&plane.normal);
    let plane_dist_sq = sqr(plane_dist);
    let radius_sq = sqr(radius);
    if plane_dist_sq > radius_sq {
        // the plane misses the ball
        return None;
    }

    let plane_radius_sq = radius_sq - plane_dist_sq;
    let plane_center = &plane.normal * plane_dist;

    let mut result = if direction_opt {
        let plane_opt_velocity = opt_velocity - &(&plane.normal * opt_velocity.dot(&plane.normal));
        let plane_opt_velocity_length_sq = abs_sq(&plane_opt_velocity);
        if plane_opt_velocity_length_sq <= sqr(EPSILON) {
            plane_center.clone()
        } else {
            &plane_center
                + &(plane_opt_velocity * (plane_radius_sq / plane_opt_velocity_length_sq).sqrt())
        }
    } else {
        let projected =
            opt_velocity + &(&plane.normal * (&plane.point - opt_velocity).dot(&plane.normal));
        if abs_sq(&projected) > radius_sq {
            let plane_result = &projected - &plane_center;
            let plane_result_length_sq = abs_sq(&plane_result);
            &plane_center + &(plane_result * (plane_radius_sq / plane_result_length_sq).sqrt())
        } else {
            projected
        }
    };

    for (i, other) in halfspaces[..plane_no].iter().enumerate() {
        if other.violation(&result) > 0.0 {
            let cross_product = cross3(&other.normal, &plane.normal);
            if abs_sq(&cross_product) <= sqr(EPSILON) {
                // parallel planes with disjoint feasible sides
                return None;
            }

            let direction = normalize(&cross_product);
            let line_normal = cross3(&direction, &plane.normal);
            let offset = (&other.point - &plane.point).dot(&other.normal)
                / line_normal.dot(&other.normal);
            let line = Line {
                point: &plane.point + &(&line_normal * offset),
                direction,
            };
            result = linear_program1(halfspaces, i, &line, radius, opt_velocity, direction_opt)?;
        }
    }

    Some(result)
}

/// Adds the half-spaces one by one. Returns how many could be satisfied
/// together with the optimum over them.
fn linear_program3(
    halfspaces: &[Halfspace],
    radius: f64,
    opt_velocity: &Array1<f64>,
    direction_opt: bool,
) -> (usize, Array1<f64>) {
    let mut result = if direction_opt {
        opt_velocity * radius
    } else if abs_sq(opt_velocity) > sqr(radius) {
        normalize(opt_velocity) * radius
    } else {
        opt_velocity.clone()
    };

    for (i, halfspace) in halfspaces.iter().enumerate() {
        if halfspace.violation(&result) > 0.0 {
            match linear_program2(halfspaces, i, radius, opt_velocity, direction_opt) {
                Some(velocity) => result = velocity,
                None => return (i, result),
            }
        }
    }

    (halfspaces.len(), result)
}

/// Minimizes the largest violation of `halfspaces[begin..]` while keeping
/// the first `hard_count` half-spaces satisfied.
fn linear_program4(
    halfspaces: &[Halfspace],
    hard_count: usize,
    begin: usize,
    radius: f64,
    mut result: Array1<f64>,
) -> Array1<f64> {
    let mut distance = 0.0;

    for i in begin..halfspaces.len() {
        let plane = &halfspaces[i];
        if plane.violation(&result) <= distance {
            continue;
        }

        let mut projected: Vec<Halfspace> = halfspaces[..hard_count].to_vec();
        for other in &halfspaces[hard_count..i] {
            let cross_product = cross3(&other.normal, &plane.normal);
            let point = if abs_sq(&cross_product) <= sqr(EPSILON) {
                if plane.normal.dot(&other.normal) > 0.0 {
                    continue;
                }
                (&plane.point + &other.point) * 0.5
            } else {
                let line_normal = cross3(&cross_product, &plane.normal);
                let offset = (&other.point - &plane.point).dot(&other.normal)
                    / line_normal.dot(&other.normal);
                &plane.point + &(&line_normal * offset)
            };
            projected.push(Halfspace::new(
                point,
                normalize(&(&other.normal - &plane.normal)),
            ));
        }

        let (fail, candidate) = linear_program3(&projected, radius, &plane.normal, true);
        if fail == projected.len() {
            result = candidate;
        }
        distance = plane.violation(&result);
    }

    result
}
