//! Static 2D obstacles and the binary space partition used to find the
//! obstacle edges near an agent.

use std::fmt;

use log::debug;
use ndarray::Array1;

use crate::{
    error::{Error, Result},
    geometry::{dist_sq_point_segment, left_of},
    math::{cross, dist_sq, normalize, sqr, EPSILON},
    registry::check_vector,
};

/// Handle of an obstacle chain as it was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId(pub(crate) usize);

impl ObstacleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ObstacleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One vertex of a processed obstacle. Together with `next` it describes the
/// edge from `point` to the next vertex.
#[derive(Debug, Clone)]
pub(crate) struct ObstacleVertex {
    pub id: usize,
    pub point: Array1<f64>,
    pub unit_dir: Array1<f64>,
    pub convex: bool,
    pub prev: usize,
    pub next: usize,
}

#[derive(Debug, Clone)]
struct TreeNode {
    vertex: usize,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

/// An obstacle edge near an agent, identified by its first vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ObstacleNeighbor {
    pub dist_sq: f64,
    pub vertex: usize,
}

/// Registered obstacle chains and, once processed, their vertex arena and
/// partition tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct ObstacleMap {
    chains: Vec<Vec<Array1<f64>>>,
    vertices: Vec<ObstacleVertex>,
    tree: Option<Box<TreeNode>>,
    processed: bool,
}

impl ObstacleMap {
    /// Registers a closed vertex chain. Counter-clockwise chains keep agents
    /// outside, clockwise chains keep them inside. A chain of two vertices is
    /// a segment that blocks from both sides.
    pub fn add_chain(&mut self, vertices: Vec<Array1<f64>>) -> Result<ObstacleId> {
        if vertices.len() < 2 {
            return Err(Error::DegenerateGeometry(format!(
                "an obstacle needs at least two vertices, got {}",
                vertices.len()
            )));
        }
        for vertex in &vertices {
            check_vector(2, "obstacle vertex", vertex)?;
        }
        check_distinct(&vertices)?;

        let id = ObstacleId(self.chains.len());
        debug!("adding obstacle {} with {} vertices", id, vertices.len());
        self.chains.push(vertices);
        self.processed = false;
        Ok(id)
    }

    pub fn chain(&self, id: ObstacleId) -> Result<&[Array1<f64>]> {
        self.chains
            .get(id.0)
            .map(Vec::as_slice)
            .ok_or(Error::InvalidIdentifier {
                kind: "obstacle",
                index: id.0,
            })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_processed(&self) -> bool {
        self.processed || self.chains.is_empty()
    }

    pub fn vertex(&self, index: usize) -> &ObstacleVertex {
        &self.vertices[index]
    }

    /// Rebuilds the vertex arena and the partition tree from the registered
    /// chains. The result only depends on the registrations, so processing
    /// twice yields the same map.
    pub fn process(&mut self) {
        self.vertices.clear();
        for chain in &self.chains {
            let base = self.vertices.len();
            let count = chain.len();
            for (i, point) in chain.iter().enumerate() {
                let prev = (i + count - 1) % count;
                let next = (i + 1) % count;
                let convex = count == 2 || left_of(&chain[prev], point, &chain[next]) >= 0.0;
                self.vertices.push(ObstacleVertex {
                    id: base + i,
                    point: point.clone(),
                    unit_dir: normalize(&(&chain[next] - point)),
                    convex,
                    prev: base + prev,
                    next: base + next,
                });
            }
        }

        let registered = self.vertices.len();
        self.tree = self.build_recursive((0..registered).collect());
        self.processed = true;
        debug!(
            "processed {} obstacles: {} vertices, {} created by splitting",
            self.chains.len(),
            self.vertices.len(),
            self.vertices.len() - registered
        );
    }

    fn build_recursive(&mut self, edges: Vec<usize>) -> Option<Box<TreeNode>> {
        if edges.is_empty() {
            return None;
        }

        // pick the edge whose line splits the others most evenly
        let mut optimal_split = 0;
        let mut min_left = edges.len();
        let mut min_right = edges.len();
        for (i, &edge_i) in edges.iter().enumerate() {
            let (i1, i2) = self.edge(edge_i);
            let mut left_size = 0;
            let mut right_size = 0;
            for (j, &edge_j) in edges.iter().enumerate() {
                if i == j {
                    continue;
                }
                let (j1, j2) = self.edge(edge_j);
                let j1_left_of_i = left_of(i1, i2, j1);
                let j2_left_of_i = left_of(i1, i2, j2);
                if j1_left_of_i >= -EPSILON && j2_left_of_i >= -EPSILON {
                    left_size += 1;
                } else if j1_left_of_i <= EPSILON && j2_left_of_i <= EPSILON {
                    right_size += 1;
                } else {
                    left_size += 1;
                    right_size += 1;
                }
                if balance(left_size, right_size) >= balance(min_left, min_right) {
                    break;
                }
            }
            if balance(left_size, right_size) < balance(min_left, min_right) {
                min_left = left_size;
                min_right = right_size;
                optimal_split = i;
            }
        }

        let split_vertex = edges[optimal_split];
        let i1 = self.vertices[split_vertex].point.clone();
        let i2 = self.vertices[self.vertices[split_vertex].next].point.clone();
        let split_dir = &i2 - &i1;

        let mut left = Vec::with_capacity(min_left);
        let mut right = Vec::with_capacity(min_right);
        for (j, &edge_j) in edges.iter().enumerate() {
            if j == optimal_split {
                continue;
            }
            let j2_index = self.vertices[edge_j].next;
            let j1 = self.vertices[edge_j].point.clone();
            let j2 = self.vertices[j2_index].point.clone();
            let j1_left_of_i = left_of(&i1, &i2, &j1);
            let j2_left_of_i = left_of(&i1, &i2, &j2);

            if j1_left_of_i >= -EPSILON && j2_left_of_i >= -EPSILON {
                left.push(edge_j);
            } else if j1_left_of_i <= EPSILON && j2_left_of_i <= EPSILON {
                right.push(edge_j);
            } else {
                // edge j straddles the split line, cut it in two
                let t = cross(&split_dir, &(&j1 - &i1)) / cross(&split_dir, &(&j1 - &j2));
                let split_point = &j1 + &((&j2 - &j1) * t);
                let unit_dir = self.vertices[edge_j].unit_dir.clone();
                let new_index = self.vertices.len();
                self.vertices.push(ObstacleVertex {
                    id: new_index,
                    point: split_point,
                    unit_dir,
                    convex: true,
                    prev: edge_j,
                    next: j2_index,
                });
                self.vertices[edge_j].next = new_index;
                self.vertices[j2_index].prev = new_index;

                if j1_left_of_i > 0.0 {
                    left.push(edge_j);
                    right.push(new_index);
                } else {
                    right.push(edge_j);
                    left.push(new_index);
                }
            }
        }

        let left = self.build_recursive(left);
        let right = self.build_recursive(right);
        Some(Box::new(TreeNode {
            vertex: split_vertex,
            left,
            right,
        }))
    }

    fn edge(&self, vertex: usize) -> (&Array1<f64>, &Array1<f64>) {
        let first = &self.vertices[vertex];
        (&first.point, &self.vertices[first.next].point)
    }

    /// Obstacle edges within `range` of `position` that face the position,
    /// ordered by squared distance and then by vertex id.
    pub fn query(&self, position: &Array1<f64>, range: f64) -> Vec<ObstacleNeighbor> {
        let mut neighbors = Vec::new();
        self.query_recursive(self.tree.as_deref(), position, sqr(range), &mut neighbors);
        neighbors.sort_by(|a, b| {
            a.dist_sq
                .total_cmp(&b.dist_sq)
                .then(self.vertices[a.vertex].id.cmp(&self.vertices[b.vertex].id))
        });
        neighbors
    }

    fn query_recursive(
        &self,
        node: Option<&TreeNode>,
        position: &Array1<f64>,
        range_sq: f64,
        neighbors: &mut Vec<ObstacleNeighbor>,
    ) {
        let Some(node) = node else {
            return;
        };
        let (point1, point2) = self.edge(node.vertex);
        let agent_left_of_line = left_of(point1, point2, position);
        let (near, far) = if agent_left_of_line >= 0.0 {
            (node.left.as_deref(), node.right.as_deref())
        } else {
            (node.right.as_deref(), node.left.as_deref())
        };

        self.query_recursive(near, position, range_sq, neighbors);

        let dist_sq_line = sqr(agent_left_of_line) / dist_sq(point2, point1);
        if dist_sq_line < range_sq {
            // only edges seen from their outer side can be collided with
            if agent_left_of_line < 0.0 {
                let edge_dist_sq = dist_sq_point_segment(point1, point2, position);
                if edge_dist_sq < range_sq {
                    neighbors.push(ObstacleNeighbor {
                        dist_sq: edge_dist_sq,
                        vertex: node.vertex,
                    });
                }
            }
            self.query_recursive(far, position, range_sq, neighbors);
        }
    }

    /// Whether a disk of `radius` can move in a straight line from `from` to
    /// `to` without touching an obstacle.
    pub fn is_visible(&self, from: &Array1<f64>, to: &Array1<f64>, radius: f64) -> bool {
        self.visible_recursive(self.tree.as_deref(), from, to, radius)
    }

    fn visible_recursive(
        &self,
        node: Option<&TreeNode>,
        q1: &Array1<f64>,
        q2: &Array1<f64>,
        radius: f64,
    ) -> bool {
        let Some(node) = node else {
            return true;
        };
        let (point1, point2) = self.edge(node.vertex);
        let q1_left_of_i = left_of(point1, point2, q1);
        let q2_left_of_i = left_of(point1, point2, q2);
        let inv_length_i = 1.0 / dist_sq(point2, point1);
        let radius_sq = sqr(radius);
        let clear_of_line = sqr(q1_left_of_i) * inv_length_i >= radius_sq
            && sqr(q2_left_of_i) * inv_length_i >= radius_sq;

        let left = node.left.as_deref();
        let right = node.right.as_deref();

        if q1_left_of_i >= 0.0 && q2_left_of_i >= 0.0 {
            self.visible_recursive(left, q1, q2, radius)
                && (clear_of_line || self.visible_recursive(right, q1, q2, radius))
        } else if q1_left_of_i <= 0.0 && q2_left_of_i <= 0.0 {
            self.visible_recursive(right, q1, q2, radius)
                && (clear_of_line || self.visible_recursive(left, q1, q2, radius))
        } else if q1_left_of_i >= 0.0 && q2_left_of_i <= 0.0 {
            // leaving through the back side of the edge
            self.visible_recursive(left, q1, q2, radius)
                && self.visible_recursive(right, q1, q2, radius)
        } else {
            let point1_left_of_q = left_of(q1, q2, point1);
            let point2_left_of_q = left_of(q1, q2, point2);
            let inv_length_q = 1.0 / dist_sq(q2, q1);
            point1_left_of_q * point2_left_of_q >= 0.0
                && sqr(point1_left_of_q) * inv_length_q > radius_sq
                && sqr(point2_left_of_q) * inv_length_q > radius_sq
                && self.visible_recursive(left, q1, q2, radius)
                && self.visible_recursive(right, q1, q2, radius)
        }
    }
}

fn balance(left: usize, right: usize) -> (usize, usize) {
    (left.max(right), left.min(right))
}

fn check_distinct(vertices: &[Array1<f64>]) -> Result<()> {
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            if dist_sq(&vertices[i], &vertices[j]) <= sqr(EPSILON) {
                let reason = if j == i + 1 || (i == 0 && j == vertices.len() - 1) {
                    format!("zero-length edge between vertices {} and {}", i, j)
                } else {
                    format!("vertices {} and {} coincide", i, j)
                };
                return Err(Error::DegenerateGeometry(reason));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn square(center: (f64, f64), half_width: f64) -> Vec<Array1<f64>> {
        let (x, y) = center;
        vec![
            arr1(&[x - half_width, y - half_width]),
            arr1(&[x + half_width, y - half_width]),
            arr1(&[x + half_width, y + half_width]),
            arr1(&[x - half_width, y + half_width]),
        ]
    }

    #[test]
    fn test_rejects_degenerate_chains() {
        let mut map = ObstacleMap::default();
        assert!(matches!(
            map.add_chain(vec![arr1(&[0.0, 0.0])]),
            Err(Error::DegenerateGeometry(_))
        ));
        assert!(matches!(
            map.add_chain(vec![arr1(&[0.0, 0.0]), arr1(&[0.0, 0.0]), arr1(&[1.0, 0.0])]),
            Err(Error::DegenerateGeometry(_))
        ));
        assert!(matches!(
            map.add_chain(vec![
                arr1(&[0.0, 0.0]),
                arr1(&[1.0, 0.0]),
                arr1(&[0.0, 0.0]),
                arr1(&[0.0, 1.0]),
            ]),
            Err(Error::DegenerateGeometry(_))
        ));
        assert_eq!(
            map.add_chain(vec![arr1(&[0.0, 0.0, 0.0]), arr1(&[1.0, 0.0, 0.0])]),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 3
            })
        );
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_processing_state() {
        let mut map = ObstacleMap::default();
        assert!(map.is_processed());
        let id = map.add_chain(square((0.0, 0.0), 1.0)).unwrap();
        assert!(!map.is_processed());
        map.process();
        assert!(map.is_processed());
        assert_eq!(map.chain(id).unwrap().len(), 4);
        // a convex polygon is never split
        assert_eq!(map.vertices.len(), 4);
        assert_eq!(map.vertex(0).prev, 3);
        assert_eq!(map.vertex(3).next, 0);
        assert!(map.chain(ObstacleId(7)).is_err());
    }

    #[test]
    fn test_convexity() {
        // L-shape with one reflex corner at (1, 1)
        let mut map = ObstacleMap::default();
        map.add_chain(vec![
            arr1(&[0.0, 0.0]),
            arr1(&[2.0, 0.0]),
            arr1(&[2.0, 1.0]),
            arr1(&[1.0, 1.0]),
            arr1(&[1.0, 2.0]),
            arr1(&[0.0, 2.0]),
        ])
        .unwrap();
        map.process();
        let convex: Vec<bool> = (0..6).map(|i| map.vertex(i).convex).collect();
        assert_eq!(convex, vec![true, true, true, false, true, true]);
        assert_eq!(map.vertex(0).unit_dir, arr1(&[1.0, 0.0]));
    }

    #[test]
    fn test_query_returns_facing_edges() {
        let mut map = ObstacleMap::default();
        map.add_chain(square((0.0, 0.0), 1.0)).unwrap();
        map.process();

        // the agent sees the right and the top edge of the square
        let neighbors = map.query(&arr1(&[2.0, 2.0]), 5.0);
        let vertices: Vec<usize> = neighbors.iter().map(|n| n.vertex).collect();
        assert_eq!(vertices, vec![1, 2]);
        assert_eq!(neighbors[0].dist_sq, 2.0);

        // nothing in range
        assert!(map.query(&arr1(&[10.0, 10.0]), 1.0).is_empty());
    }

    #[test]
    fn test_query_with_split_edges_matches_brute_force() {
        let mut map = ObstacleMap::default();
        map.add_chain(square((0.0, 0.0), 1.0)).unwrap();
        map.add_chain(square((3.0, 0.5), 0.5)).unwrap();
        // a long wall that crosses the lines of both squares
        map.add_chain(vec![arr1(&[-4.0, 3.0]), arr1(&[5.0, -3.0])]).unwrap();
        map.process();

        for i in 0..9 {
            for j in 0..9 {
                let position = arr1(&[-4.0 + i as f64 * 1.03, -4.0 + j as f64 * 0.97]);
                let range = 2.5;
                let mut found: Vec<usize> = map
                    .query(&position, range)
                    .iter()
                    .map(|n| n.vertex)
                    .collect();
                found.sort();

                let expected: Vec<usize> = (0..map.vertices.len())
                    .filter(|&v| {
                        let (a, b) = map.edge(v);
                        left_of(a, b, &position) < 0.0
                            && dist_sq_point_segment(a, b, &position) < range * range
                    })
                    .collect();
                assert_eq!(found, expected, "query at {:?}", position);
            }
        }
    }

    #[test]
    fn test_visibility() {
        let mut map = ObstacleMap::default();
        map.add_chain(square((0.0, 0.0), 1.0)).unwrap();
        map.process();

        assert!(!map.is_visible(&arr1(&[-2.0, 0.0]), &arr1(&[2.0, 0.0]), 0.1));
        assert!(map.is_visible(&arr1(&[-2.0, 2.0]), &arr1(&[2.0, 2.0]), 0.5));
        assert!(!map.is_visible(&arr1(&[-2.0, 2.0]), &arr1(&[2.0, 2.0]), 2.0));
    }

    #[test]
    fn test_processing_is_repeatable() {
        let mut map = ObstacleMap::default();
        map.add_chain(square((0.0, 0.0), 1.0)).unwrap();
        map.add_chain(vec![arr1(&[-4.0, 3.0]), arr1(&[5.0, -3.0])]).unwrap();
        map.process();
        let first: Vec<Array1<f64>> = map.vertices.iter().map(|v| v.point.clone()).collect();
        map.process();
        let second: Vec<Array1<f64>> = map.vertices.iter().map(|v| v.point.clone()).collect();
        assert_eq!(first, second);
    }
}
