use ndarray::{arr1, Array1};

/// Threshold below which lengths and determinants are treated as zero.
/// Squared magnitudes are compared against `sqr(EPSILON)`.
pub const EPSILON: f64 = 1e-5;

pub fn sqr(value: f64) -> f64 {
    value * value
}

pub fn norm(vector: &Array1<f64>) -> f64 {
    return vector.dot(vector).sqrt();
}

pub fn abs_sq(vector: &Array1<f64>) -> f64 {
    return vector.dot(vector);
}

pub fn dist(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    return norm(&(x - y));
}

pub fn dist_sq(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    return abs_sq(&(x - y));
}

/// Unit vector in the direction of `vec`, or the zero vector if `vec` has no
/// length.
pub fn normalize(vec: &Array1<f64>) -> Array1<f64> {
    let len = norm(vec);
    if len == 0.0 {
        return Array1::zeros(vec.len());
    }
    return vec / len;
}

/// Shortens `vec` to `max_len` if it is longer.
pub fn clamp_norm(vec: &Array1<f64>, max_len: f64) -> Array1<f64> {
    let len = norm(vec);
    if len > max_len && len > 0.0 {
        return vec * (max_len / len);
    }
    return vec.clone();
}

/// Determinant of two 2D vectors.
pub fn cross(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    return a[0] * b[1] - a[1] * b[0];
}

pub fn cross3(a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
    return arr1(&[
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]);
}

/// Rotates a 2D vector by 90 degrees counter-clockwise.
pub fn perp(a: &Array1<f64>) -> Array1<f64> {
    return arr1(&[-a[1], a[0]]);
}

pub fn is_finite(vec: &Array1<f64>) -> bool {
    vec.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(&arr1(&[0.0, 0.0, 0.0])), arr1(&[0.0, 0.0, 0.0]));
        assert_abs_diff_eq!(norm(&normalize(&arr1(&[3.0, -4.0]))), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clamp_norm() {
        let clamped = clamp_norm(&arr1(&[3.0, 4.0]), 2.0);
        assert_abs_diff_eq!(clamped[0], 1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(clamped[1], 1.6, epsilon = 1e-12);
        assert_eq!(clamp_norm(&arr1(&[0.3, 0.4]), 2.0), arr1(&[0.3, 0.4]));
    }

    #[test]
    fn test_cross_products() {
        assert_eq!(cross(&arr1(&[1.0, 0.0]), &arr1(&[0.0, 1.0])), 1.0);
        assert_eq!(
            cross3(&arr1(&[1.0, 0.0, 0.0]), &arr1(&[0.0, 1.0, 0.0])),
            arr1(&[0.0, 0.0, 1.0])
        );
        assert_eq!(perp(&arr1(&[1.0, 0.0])), arr1(&[-0.0, 1.0]));
    }
}
