//! k-d tree over agent positions, rebuilt once per step.
//!
//! Works for any dimension: each inner node splits its bounding box at the
//! midpoint of the widest axis.

use log::trace;
use ndarray::Array1;

use crate::{
    agent::AgentId,
    math::{dist_sq, sqr},
    registry::AgentRegistry,
};

const MAX_LEAF_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct Node {
    begin: usize,
    end: usize,
    min: Vec<f64>,
    max: Vec<f64>,
    children: Option<(usize, usize)>,
}

impl Node {
    /// Squared distance from `point` to the bounding box of this node.
    fn dist_sq(&self, point: &Array1<f64>) -> f64 {
        point
            .iter()
            .enumerate()
            .map(|(axis, &value)| {
                sqr((self.min[axis] - value).max(0.0)) + sqr((value - self.max[axis]).max(0.0))
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: AgentId,
    position: Array1<f64>,
}

/// A neighbor found by a tree query together with its squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AgentNeighbor {
    pub dist_sq: f64,
    pub id: AgentId,
}

impl AgentNeighbor {
    fn precedes(&self, other: &AgentNeighbor) -> bool {
        self.dist_sq < other.dist_sq || (self.dist_sq == other.dist_sq && self.id < other.id)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AgentTree {
    entries: Vec<Entry>,
    nodes: Vec<Node>,
}

impl AgentTree {
    pub fn build(agents: &AgentRegistry) -> Self {
        let mut tree = AgentTree {
            entries: agents
                .iter()
                .map(|agent| Entry {
                    id: agent.id,
                    position: agent.position.clone(),
                })
                .collect(),
            nodes: Vec::new(),
        };
        if !tree.entries.is_empty() {
            tree.build_recursive(0, tree.entries.len());
        }
        trace!(
            "built agent tree with {} agents in {} nodes",
            tree.entries.len(),
            tree.nodes.len()
        );
        tree
    }

    fn build_recursive(&mut self, begin: usize, end: usize) -> usize {
        let dimension = self.entries[begin].position.len();
        let mut min = vec![f64::INFINITY; dimension];
        let mut max = vec![f64::NEG_INFINITY; dimension];
        for entry in &self.entries[begin..end] {
            for axis in 0..dimension {
                min[axis] = min[axis].min(entry.position[axis]);
                max[axis] = max[axis].max(entry.position[axis]);
            }
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            begin,
            end,
            min: min.clone(),
            max: max.clone(),
            children: None,
        });

        if end - begin <= MAX_LEAF_SIZE {
            return index;
        }

        let axis = (0..dimension)
            .max_by(|&a, &b| (max[a] - min[a]).total_cmp(&(max[b] - min[b])))
            .unwrap_or(0);
        let split_value = 0.5 * (max[axis] + min[axis]);

        let mut left = begin;
        let mut right = end;
        while left < right {
            while left < right && self.entries[left].position[axis] < split_value {
                left += 1;
            }
            while right > left && self.entries[right - 1].position[axis] >= split_value {
                right -= 1;
            }
            if left < right {
                self.entries.swap(left, right - 1);
                left += 1;
                right -= 1;
            }
        }

        // all agents on one spot: force a split so the recursion terminates
        if left == begin {
            left += 1;
        }

        let left_child = self.build_recursive(begin, left);
        let right_child = self.build_recursive(left, end);
        self.nodes[index].children = Some((left_child, right_child));
        index
    }

    /// Up to `max_neighbors` agents within `range` of `position`, excluding
    /// `exclude`, ordered by ascending squared distance and then by id.
    pub fn query(
        &self,
        position: &Array1<f64>,
        range: f64,
        max_neighbors: usize,
        exclude: AgentId,
    ) -> Vec<AgentNeighbor> {
        let mut neighbors = Vec::with_capacity(max_neighbors.min(self.entries.len()));
        if max_neighbors == 0 || self.nodes.is_empty() {
            return neighbors;
        }
        let mut range_sq = sqr(range);
        self.query_recursive(
            0,
            position,
            &mut range_sq,
            max_neighbors,
            exclude,
            &mut neighbors,
        );
        neighbors
    }

    fn query_recursive(
        &self,
        node: usize,
        position: &Array1<f64>,
        range_sq: &mut f64,
        max_neighbors: usize,
        exclude: AgentId,
        neighbors: &mut Vec<AgentNeighbor>,
    ) {
        let current = &self.nodes[node];
        match current.children {
            None => {
                for entry in &self.entries[current.begin..current.end] {
                    if entry.id == exclude {
                        continue;
                    }
                    let candidate = AgentNeighbor {
                        dist_sq: dist_sq(position, &entry.position),
                        id: entry.id,
                    };
                    insert_neighbor(neighbors, candidate, max_neighbors, range_sq);
                }
            }
            Some((left, right)) => {
                let dist_sq_left = self.nodes[left].dist_sq(position);
                let dist_sq_right = self.nodes[right].dist_sq(position);
                let (near, dist_sq_near, far, dist_sq_far) = if dist_sq_left < dist_sq_right {
                    (left, dist_sq_left, right, dist_sq_right)
                } else {
                    (right, dist_sq_right, left, dist_sq_left)
                };
                if dist_sq_near <= *range_sq {
                    self.query_recursive(near, position, range_sq, max_neighbors, exclude, neighbors);
                }
                if dist_sq_far <= *range_sq {
                    self.query_recursive(far, position, range_sq, max_neighbors, exclude, neighbors);
                }
            }
        }
    }
}

/// Sorted insert that keeps at most `max_neighbors` entries and shrinks
/// `range_sq` to the farthest kept neighbor once the list is full.
fn insert_neighbor(
    neighbors: &mut Vec<AgentNeighbor>,
    candidate: AgentNeighbor,
    max_neighbors: usize,
    range_sq: &mut f64,
) {
    if candidate.dist_sq > *range_sq {
        return;
    }
    let position = neighbors.partition_point(|kept| kept.precedes(&candidate));
    if neighbors.len() == max_neighbors {
        if position == max_neighbors {
            return;
        }
        neighbors.pop();
    }
    neighbors.insert(position, candidate);
    if neighbors.len() == max_neighbors {
        *range_sq = neighbors[max_neighbors - 1].dist_sq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentParams;
    use ndarray::arr1;

    fn grid_registry(dimension: usize) -> AgentRegistry {
        let mut registry = AgentRegistry::new(dimension);
        for i in 0..7 {
            for j in 0..7 {
                let mut position = Array1::zeros(dimension);
                position[0] = i as f64 * 0.7;
                position[1] = j as f64 * 1.1;
                if dimension == 3 {
                    position[2] = ((i * 7 + j) % 3) as f64;
                }
                registry.add(position, AgentParams::default()).unwrap();
            }
        }
        registry
    }

    fn brute_force(
        registry: &AgentRegistry,
        position: &Array1<f64>,
        range: f64,
        max_neighbors: usize,
        exclude: AgentId,
    ) -> Vec<AgentId> {
        let mut all: Vec<(f64, AgentId)> = registry
            .iter()
            .filter(|agent| agent.id != exclude)
            .map(|agent| (dist_sq(position, &agent.position), agent.id))
            .filter(|(d, _)| *d <= range * range)
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(max_neighbors).map(|(_, id)| id).collect()
    }

    #[test]
    fn test_query_matches_brute_force() {
        for dimension in [2, 3] {
            let registry = grid_registry(dimension);
            let tree = AgentTree::build(&registry);
            for agent in registry.iter() {
                for (range, max_neighbors) in [(1.5, 4), (3.0, 10), (100.0, 60)] {
                    let found: Vec<AgentId> = tree
                        .query(&agent.position, range, max_neighbors, agent.id)
                        .iter()
                        .map(|neighbor| neighbor.id)
                        .collect();
                    assert_eq!(
                        found,
                        brute_force(&registry, &agent.position, range, max_neighbors, agent.id)
                    );
                }
            }
        }
    }

    #[test]
    fn test_ties_are_ordered_by_id() {
        let mut registry = AgentRegistry::new(2);
        let center = registry.add(arr1(&[0.0, 0.0]), AgentParams::default()).unwrap();
        let east = registry.add(arr1(&[1.0, 0.0]), AgentParams::default()).unwrap();
        let west = registry.add(arr1(&[-1.0, 0.0]), AgentParams::default()).unwrap();
        let north = registry.add(arr1(&[0.0, 1.0]), AgentParams::default()).unwrap();

        let tree = AgentTree::build(&registry);
        let found: Vec<AgentId> = tree
            .query(&arr1(&[0.0, 0.0]), 5.0, 2, center)
            .iter()
            .map(|neighbor| neighbor.id)
            .collect();
        assert_eq!(found, vec![east, west]);
        assert!(!found.contains(&north));
    }

    #[test]
    fn test_coincident_agents() {
        let mut registry = AgentRegistry::new(2);
        for _ in 0..25 {
            registry.add(arr1(&[1.0, 1.0]), AgentParams::default()).unwrap();
        }
        let tree = AgentTree::build(&registry);
        assert_eq!(tree.query(&arr1(&[1.0, 1.0]), 0.5, 30, AgentId(0)).len(), 24);
    }

    #[test]
    fn test_unbounded_neighbor_count() {
        let registry = grid_registry(2);
        let tree = AgentTree::build(&registry);
        let found = tree.query(&arr1(&[0.0, 0.0]), 100.0, usize::MAX, AgentId(0));
        assert_eq!(found.len(), 48);
        assert!(found.windows(2).all(|pair| pair[0].dist_sq <= pair[1].dist_sq));
    }

    #[test]
    fn test_empty_tree() {
        let registry = AgentRegistry::new(2);
        let tree = AgentTree::build(&registry);
        assert!(tree.query(&arr1(&[0.0, 0.0]), 10.0, 5, AgentId(0)).is_empty());
    }
}
