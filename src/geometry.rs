use ndarray::{arr1, Array1};

use crate::{
    halfplane::Halfplane,
    math::{abs_sq, cross, cross3, dist_sq, sqr, EPSILON},
};

/// Interval of `t` for which `point + t * direction` lies inside the ball of
/// `radius` around the origin. `direction` must be unit length. Works in any
/// dimension.
pub fn clip_line_to_ball(
    point: &Array1<f64>,
    direction: &Array1<f64>,
    radius: f64,
) -> Option<(f64, f64)> {
    let dot_product = point.dot(direction);
    let discriminant = sqr(dot_product) + sqr(radius) - abs_sq(point);
    if discriminant < 0.0 {
        // the max speed ball does not reach the line
        return None;
    }
    let sqrt_discriminant = discriminant.sqrt();
    Some((-dot_product - sqrt_discriminant, -dot_product + sqrt_discriminant))
}

/// Narrow the interval `(left, right)` along the boundary of `plane` to the
/// part that lies inside every one of `other_planes`.
pub fn clip_by_halfplanes(
    plane: &Halfplane,
    other_planes: &[Halfplane],
    (mut left, mut right): (f64, f64),
) -> Option<(f64, f64)> {
    for other_plane in other_planes {
        let denominator = cross(&plane.direction, &other_plane.direction);
        let numerator = cross(&other_plane.direction, &(&plane.point - &other_plane.point));

        if denominator.abs() <= EPSILON {
            // lines are parallel
            if numerator < 0.0 {
                return None;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            right = right.min(t);
        } else {
            left = left.max(t);
        }

        if left > right {
            return None;
        }
    }

    Some((left, right))
}

/// Positive if `c` lies to the left of the directed line from `a` to `b`.
pub fn left_of(a: &Array1<f64>, b: &Array1<f64>, c: &Array1<f64>) -> f64 {
    cross(&(a - c), &(b - a))
}

pub fn closest_point_on_segment(
    a: &Array1<f64>,
    b: &Array1<f64>,
    point: &Array1<f64>,
) -> Array1<f64> {
    let segment = b - a;
    let length_sq = abs_sq(&segment);
    if length_sq == 0.0 {
        return a.clone();
    }
    let t = ((point - a).dot(&segment) / length_sq).clamp(0.0, 1.0);
    a + &(&segment * t)
}

pub fn dist_sq_point_segment(a: &Array1<f64>, b: &Array1<f64>, point: &Array1<f64>) -> f64 {
    dist_sq(point, &closest_point_on_segment(a, b, point))
}

/// Unit directions of the two tangents from the origin to the circle of
/// `radius` around `center`, left tangent first. `center` must lie outside
/// the circle.
pub fn tangent_legs(center: &Array1<f64>, radius: f64) -> (Array1<f64>, Array1<f64>) {
    let dist_sq = abs_sq(center);
    let leg = (dist_sq - sqr(radius)).max(0.0).sqrt();
    let (x, y) = (center[0], center[1]);
    let left = arr1(&[x * leg - y * radius, x * radius + y * leg]) / dist_sq;
    let right = arr1(&[x * leg + y * radius, -x * radius + y * leg]) / dist_sq;
    (left, right)
}

/// Area vector of a planar polygon (Newell's method): it follows the winding
/// of the vertices and its length is twice the area.
pub fn polygon_area_vector(vertices: &[Array1<f64>]) -> Array1<f64> {
    let mut normal = Array1::zeros(3);
    for (i, current) in vertices.iter().enumerate() {
        let next = &vertices[(i + 1) % vertices.len()];
        normal[0] += (current[1] - next[1]) * (current[2] + next[2]);
        normal[1] += (current[2] - next[2]) * (current[0] + next[0]);
        normal[2] += (current[0] - next[0]) * (current[1] + next[1]);
    }
    normal
}

/// Closest point to `point` on a convex planar polygon with unit `normal`.
pub fn closest_point_on_convex_polygon(
    point: &Array1<f64>,
    vertices: &[Array1<f64>],
    normal: &Array1<f64>,
) -> Array1<f64> {
    let height = (point - &vertices[0]).dot(normal);
    let projected = point - &(normal * height);

    let count = vertices.len();
    let inside = (0..count).all(|i| {
        let edge = &vertices[(i + 1) % count] - &vertices[i];
        cross3(&edge, &(&projected - &vertices[i])).dot(normal) >= 0.0
    });
    if inside {
        return projected;
    }

    let mut best = vertices[0].clone();
    let mut best_dist_sq = f64::INFINITY;
    for i in 0..count {
        let candidate = closest_point_on_segment(&vertices[i], &vertices[(i + 1) % count], point);
        let candidate_dist_sq = dist_sq(point, &candidate);
        if candidate_dist_sq < best_dist_sq {
            best_dist_sq = candidate_dist_sq;
            best = candidate;
        }
    }
    best
}
