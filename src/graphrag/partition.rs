//! Graph partitioning.
//!
//! [`Partitioner`] is the seam to any community-detection library. The
//! bundled [`LouvainPartitioner`] is a deterministic modularity optimiser:
//! local moving of vertices in index order followed by aggregation, repeated
//! for at most `max_iterations` levels. Edges are treated as undirected.

use std::collections::HashMap;

use crate::{Error, Result};

/// Turns an edge list into groups of vertex indices.
pub trait Partitioner: Send + Sync {
    fn partition(
        &self,
        vertices: &[String],
        edges: &[(usize, usize)],
        resolution: f64,
        max_iterations: usize,
    ) -> Result<Vec<Vec<usize>>>;
}

/// Cap on local-moving sweeps within one level.
const MAX_SWEEPS: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct LouvainPartitioner;

impl LouvainPartitioner {
    pub fn new() -> Self {
        Self
    }
}

/// Weighted undirected graph for one Louvain level. Self-loop weights are
/// stored doubled so a vertex degree is the plain row sum.
struct Level {
    adjacency: Vec<HashMap<usize, f64>>,
}

impl Level {
    fn from_edges(vertex_count: usize, edges: &[(usize, usize)]) -> Self {
        let mut adjacency = vec![HashMap::new(); vertex_count];
        for &(u, v) in edges {
            if u == v {
                *adjacency[u].entry(u).or_insert(0.0) += 2.0;
            } else {
                *adjacency[u].entry(v).or_insert(0.0) += 1.0;
                *adjacency[v].entry(u).or_insert(0.0) += 1.0;
            }
        }
        Self { adjacency }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn degrees(&self) -> Vec<f64> {
        self.adjacency.iter().map(|row| row.values().sum()).collect()
    }

    /// Move vertices between communities until no move improves modularity.
    /// Returns dense community labels and whether anything moved.
    fn local_moving(&self, resolution: f64) -> (Vec<usize>, bool) {
        let n = self.len();
        let degrees = self.degrees();
        let total: f64 = degrees.iter().sum();
        let mut community: Vec<usize> = (0..n).collect();
        if total <= 0.0 {
            return (community, false);
        }

        let mut community_degree = degrees.clone();
        let mut moved_any = false;

        for _ in 0..MAX_SWEEPS {
            let mut moved = false;
            for vertex in 0..n {
                let current = community[vertex];
                let degree = degrees[vertex];

                let mut links: HashMap<usize, f64> = HashMap::new();
                for (&neighbor, &weight) in &self.adjacency[vertex] {
                    if neighbor != vertex {
                        *links.entry(community[neighbor]).or_insert(0.0) += weight;
                    }
                }

                community_degree[current] -= degree;
                let gain = |c: usize, w: f64| w - resolution * community_degree[c] * degree / total;

                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                let mut candidates: Vec<(&usize, &f64)> = links.iter().collect();
                candidates.sort_by_key(|(c, _)| **c);
                for (&c, &w) in candidates {
                    let g = gain(c, w);
                    if g > best_gain + f64::EPSILON {
                        best = c;
                        best_gain = g;
                    }
                }

                community_degree[best] += degree;
                if best != current {
                    community[vertex] = best;
                    moved = true;
                    moved_any = true;
                }
            }
            if !moved {
                break;
            }
        }

        (relabel(&community), moved_any)
    }

    fn aggregate(&self, community: &[usize]) -> Self {
        let count = community.iter().max().map_or(0, |m| m + 1);
        let mut adjacency = vec![HashMap::new(); count];
        for (vertex, row) in self.adjacency.iter().enumerate() {
            for (&neighbor, &weight) in row {
                *adjacency[community[vertex]]
                    .entry(community[neighbor])
                    .or_insert(0.0) += weight;
            }
        }
        Self { adjacency }
    }
}

/// Renumber labels densely in order of first appearance.
fn relabel(labels: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}

impl Partitioner for LouvainPartitioner {
    fn partition(
        &self,
        vertices: &[String],
        edges: &[(usize, usize)],
        resolution: f64,
        max_iterations: usize,
    ) -> Result<Vec<Vec<usize>>> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(Error::Partition(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        let n = vertices.len();
        if let Some(&(u, v)) = edges.iter().find(|(u, v)| *u >= n || *v >= n) {
            return Err(Error::Partition(format!(
                "edge ({}, {}) references a vertex outside 0..{}",
                u, v, n
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        // membership[v] = community of original vertex v at the current level
        let mut membership: Vec<usize> = (0..n).collect();
        let mut level = Level::from_edges(n, edges);

        for _ in 0..max_iterations.max(1) {
            let (labels, moved) = level.local_moving(resolution);
            for slot in membership.iter_mut() {
                *slot = labels[*slot];
            }
            if !moved {
                break;
            }
            level = level.aggregate(&labels);
        }

        let labels = relabel(&membership);
        let count = labels.iter().max().map_or(0, |m| m + 1);
        let mut groups = vec![Vec::new(); count];
        for (vertex, label) in labels.into_iter().enumerate() {
            groups[label].push(vertex);
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{}", i)).collect()
    }

    fn clique(offset: usize, size: usize) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for a in 0..size {
            for b in (a + 1)..size {
                edges.push((offset + a, offset + b));
            }
        }
        edges
    }

    #[test]
    fn separates_two_cliques_joined_by_one_edge() {
        let mut edges = clique(0, 5);
        edges.extend(clique(5, 5));
        edges.push((4, 5));

        let groups = LouvainPartitioner::new()
            .partition(&names(10), &edges, 1.0, 3)
            .unwrap();

        assert_eq!(groups, vec![vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8, 9]]);
    }

    #[test]
    fn isolated_vertices_stay_singletons() {
        let groups = LouvainPartitioner::new()
            .partition(&names(3), &[], 1.0, 3)
            .unwrap();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn every_vertex_is_assigned_exactly_once() {
        let mut edges = clique(0, 4);
        edges.extend(clique(4, 6));
        edges.push((0, 9));
        edges.push((11, 11));

        let groups = LouvainPartitioner::new()
            .partition(&names(12), &edges, 1.0, 3)
            .unwrap();

        let mut all: Vec<usize> = groups.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn partition_is_deterministic() {
        let mut edges = clique(0, 6);
        edges.extend(clique(6, 6));
        edges.push((2, 8));
        let partitioner = LouvainPartitioner::new();
        let a = partitioner.partition(&names(12), &edges, 1.0, 3).unwrap();
        let b = partitioner.partition(&names(12), &edges, 1.0, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_invalid_input() {
        let partitioner = LouvainPartitioner::new();
        assert!(partitioner.partition(&names(2), &[(0, 1)], 0.0, 3).is_err());
        assert!(partitioner.partition(&names(2), &[(0, 5)], 1.0, 3).is_err());
    }

    #[test]
    fn empty_graph_has_no_groups() {
        let groups = LouvainPartitioner::new().partition(&[], &[], 1.0, 3).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn relabel_is_dense_in_first_appearance_order() {
        assert_eq!(relabel(&[7, 3, 7, 9, 3]), vec![0, 1, 0, 2, 1]);
    }
}
