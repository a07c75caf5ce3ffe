use ndarray::Array1;

use crate::math::cross;

/// A 2D velocity constraint: the boundary line through `point` along
/// `direction`. Feasible velocities lie to the left of the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Halfplane {
    pub point: Array1<f64>,
    /// Always unit length.
    pub direction: Array1<f64>,
}

impl Halfplane {
    pub fn new(point: Array1<f64>, direction: Array1<f64>) -> Self {
        Halfplane { point, direction }
    }

    /// How far `velocity` lies on the infeasible side of the boundary. Values
    /// `<= 0` satisfy the constraint.
    pub fn violation(&self, velocity: &Array1<f64>) -> f64 {
        cross(&self.direction, &(&self.point - velocity))
    }

    pub fn contains(&self, velocity: &Array1<f64>) -> bool {
        self.violation(velocity) <= 0.0
    }
}

/// A 3D velocity constraint: the boundary plane through `point` with unit
/// `normal`. Feasible velocities lie on the side the normal points to.
#[derive(Debug, Clone, PartialEq)]
pub struct Halfspace {
    pub point: Array1<f64>,
    pub normal: Array1<f64>,
}

impl Halfspace {
    pub fn new(point: Array1<f64>, normal: Array1<f64>) -> Self {
        Halfspace { point, normal }
    }

    pub fn violation(&self, velocity: &Array1<f64>) -> f64 {
        (&self.point - velocity).dot(&self.normal)
    }

    pub fn contains(&self, velocity: &Array1<f64>) -> bool {
        self.violation(velocity) <= 0.0
    }
}
