//! Static 3D obstacles: convex planar faces.
//!
//! Faces are few in practice, so queries scan all of them and only use a
//! bounding sphere per face to skip distant ones.

use log::debug;
use ndarray::Array1;

use crate::{
    error::{Error, Result},
    geometry::{closest_point_on_convex_polygon, polygon_area_vector},
    math::{cross3, dist, dist_sq, norm, normalize, sqr, EPSILON},
    obstacle::ObstacleId,
    registry::check_vector,
};

#[derive(Debug, Clone)]
struct Face {
    vertices: Vec<Array1<f64>>,
    normal: Array1<f64>,
}

#[derive(Debug, Clone)]
struct Bounds {
    center: Array1<f64>,
    radius: f64,
}

/// A face near an agent with the point of the face closest to it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FaceNeighbor {
    pub dist_sq: f64,
    pub face: usize,
    pub closest: Array1<f64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FaceSet {
    faces: Vec<Face>,
    bounds: Vec<Bounds>,
    processed: bool,
}

impl FaceSet {
    /// Registers a face. Its vertices must be distinct, coplanar and
    /// describe a convex polygon with non-zero area.
    pub fn add_face(&mut self, vertices: Vec<Array1<f64>>) -> Result<ObstacleId> {
        if vertices.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "a face needs at least three vertices, got {}",
                vertices.len()
            )));
        }
        for vertex in &vertices {
            check_vector(3, "obstacle vertex", vertex)?;
        }
        for (i, a) in vertices.iter().enumerate() {
            if vertices[i + 1..].iter().any(|b| dist_sq(a, b) <= sqr(EPSILON)) {
                return Err(Error::DegenerateGeometry(format!(
                    "vertex {} of the face is duplicated",
                    i
                )));
            }
        }

        let area_vector = polygon_area_vector(&vertices);
        if norm(&area_vector) <= EPSILON {
            return Err(Error::DegenerateGeometry("the face has no area".to_string()));
        }
        let normal = normalize(&area_vector);
        if vertices
            .iter()
            .any(|vertex| (vertex - &vertices[0]).dot(&normal).abs() > EPSILON)
        {
            return Err(Error::DegenerateGeometry("the face is not planar".to_string()));
        }
        let count = vertices.len();
        for i in 0..count {
            let a = &vertices[i];
            let b = &vertices[(i + 1) % count];
            let c = &vertices[(i + 2) % count];
            if cross3(&(b - a), &(c - b)).dot(&normal) < -EPSILON {
                return Err(Error::DegenerateGeometry(format!(
                    "the face is not convex at vertex {}",
                    (i + 1) % count
                )));
            }
        }

        let id = ObstacleId(self.faces.len());
        debug!("adding face {} with {} vertices", id, count);
        self.faces.push(Face { vertices, normal });
        self.processed = false;
        Ok(id)
    }

    pub fn face(&self, id: ObstacleId) -> Result<&[Array1<f64>]> {
        self.faces
            .get(id.0)
            .map(|face| face.vertices.as_slice())
            .ok_or(Error::InvalidIdentifier {
                kind: "obstacle",
                index: id.0,
            })
    }

    pub fn normal(&self, face: usize) -> &Array1<f64> {
        &self.faces[face].normal
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_processed(&self) -> bool {
        self.processed || self.faces.is_empty()
    }

    /// Computes the bounding spheres used by queries.
    pub fn process(&mut self) {
        self.bounds = self
            .faces
            .iter()
            .map(|face| {
                let sum = face
                    .vertices
                    .iter()
                    .fold(Array1::<f64>::zeros(3), |sum, vertex| sum + vertex);
                let center = sum / face.vertices.len() as f64;
                let radius = face
                    .vertices
                    .iter()
                    .map(|vertex| dist(vertex, &center))
                    .fold(0.0, f64::max);
                Bounds { center, radius }
            })
            .collect();
        self.processed = true;
        debug!("processed {} faces", self.faces.len());
    }

    /// Faces within `range` of `position` ordered by squared distance and
    /// then by face id.
    pub fn query(&self, position: &Array1<f64>, range: f64) -> Vec<FaceNeighbor> {
        let range_sq = sqr(range);
        let mut neighbors: Vec<FaceNeighbor> = self
            .faces
            .iter()
            .zip(&self.bounds)
            .enumerate()
            .filter(|(_, (_, bounds))| dist(position, &bounds.center) - bounds.radius <= range)
            .filter_map(|(index, (face, _))| {
                let closest = closest_point_on_convex_polygon(position, &face.vertices, &face.normal);
                let dist_sq = dist_sq(position, &closest);
                (dist_sq <= range_sq).then_some(FaceNeighbor {
                    dist_sq,
                    face: index,
                    closest,
                })
            })
            .collect();
        neighbors.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.face.cmp(&b.face)));
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn unit_square(z: f64) -> Vec<Array1<f64>> {
        vec![
            arr1(&[0.0, 0.0, z]),
            arr1(&[1.0, 0.0, z]),
            arr1(&[1.0, 1.0, z]),
            arr1(&[0.0, 1.0, z]),
        ]
    }

    fn assert_degenerate(result: Result<ObstacleId>) {
        assert!(
            matches!(result, Err(Error::DegenerateGeometry(_))),
            "{:?}",
            result
        );
    }

    #[test]
    fn test_rejects_degenerate_faces() {
        let mut faces = FaceSet::default();
        assert_degenerate(faces.add_face(unit_square(0.0)[..2].to_vec()));
        assert_degenerate(faces.add_face(vec![
            arr1(&[0.0, 0.0, 0.0]),
            arr1(&[1.0, 0.0, 0.0]),
            arr1(&[2.0, 0.0, 0.0]),
        ]));

        let mut warped = unit_square(0.0);
        warped[2][2] = 0.5;
        assert_degenerate(faces.add_face(warped));

        assert_degenerate(faces.add_face(vec![
            arr1(&[0.0, 0.0, 0.0]),
            arr1(&[2.0, 0.0, 0.0]),
            arr1(&[1.0, 0.5, 0.0]),
            arr1(&[2.0, 2.0, 0.0]),
            arr1(&[0.0, 2.0, 0.0]),
        ]));

        // a sliver whose area is below the degeneracy threshold
        assert_degenerate(faces.add_face(vec![
            arr1(&[0.0, 0.0, 0.0]),
            arr1(&[1.0, 0.0, 0.0]),
            arr1(&[0.5, 1e-6, 0.0]),
        ]));

        let mut repeated = unit_square(0.0);
        repeated.push(arr1(&[0.0, 0.0, 0.0]));
        assert_degenerate(faces.add_face(repeated));

        assert_eq!(
            faces.add_face(vec![arr1(&[0.0, 0.0]), arr1(&[1.0, 0.0]), arr1(&[0.0, 1.0])]),
            Err(Error::DimensionMismatch {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(faces.len(), 0);
        assert!(faces.is_processed());
    }

    #[test]
    fn test_query_orders_by_distance() {
        let mut faces = FaceSet::default();
        let far = faces.add_face(unit_square(3.0)).unwrap();
        let near = faces.add_face(unit_square(-1.0)).unwrap();
        assert!(!faces.is_processed());
        faces.process();
        assert!(faces.is_processed());

        let found = faces.query(&arr1(&[0.5, 0.5, 0.5]), 10.0);
        assert_eq!(
            found.iter().map(|neighbor| neighbor.face).collect::<Vec<_>>(),
            vec![near.index(), far.index()]
        );
        assert_abs_diff_eq!(found[0].dist_sq, 2.25, epsilon = 1e-12);
        assert_eq!(found[0].closest, arr1(&[0.5, 0.5, -1.0]));

        // the far face is out of range
        assert_eq!(faces.query(&arr1(&[0.5, 0.5, 0.5]), 2.0).len(), 1);
    }

    #[test]
    fn test_query_outside_the_face() {
        let mut faces = FaceSet::default();
        faces.add_face(unit_square(0.0)).unwrap();
        faces.process();

        let found = faces.query(&arr1(&[3.0, 0.5, 1.0]), 5.0);
        assert_eq!(found.len(), 1);
        assert_abs_diff_eq!(found[0].closest[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(found[0].closest[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(found[0].closest[2], 0.0, epsilon = 1e-12);
    }
}
