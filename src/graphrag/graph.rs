use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::parser::{parse_summary, Relationship};
use super::partition::Partitioner;
use crate::config::{GraphConfig, PartitionMode};
use crate::Result;

/// Partition of graph vertices. Ids are dense from 0 and only meaningful
/// within one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: usize,
    pub members: Vec<String>,
    pub size: usize,
}

/// Entities and rendered relationships of one community's induced subgraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityDescription {
    pub entities: Vec<String>,
    pub relationships: Vec<String>,
}

/// Cached graph artifact, keyed by summaries hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub nodes: usize,
    pub edges: usize,
    pub communities: Vec<Community>,
}

/// Knowledge graph built from summary texts.
///
/// Vertex identity is the exact trimmed entity text; no fuzzy merging.
/// Edges are directed and labeled with the relation text.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeGraph {
    graph: DiGraph<String, String>,
    index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every summary and add its entities and relationships.
    pub fn from_summaries<S: AsRef<str>>(summaries: &[S]) -> Self {
        let mut graph = Self::new();
        for summary in summaries {
            let parsed = parse_summary(summary.as_ref());
            for entity in &parsed.entities {
                graph.add_entity(entity);
            }
            for relationship in &parsed.relationships {
                graph.add_relationship(relationship);
            }
        }
        info!(
            summaries = summaries.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Knowledge graph built"
        );
        graph
    }

    pub fn add_entity(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn add_relationship(&mut self, relationship: &Relationship) {
        let source = self.add_entity(&relationship.source);
        let target = self.add_entity(&relationship.target);
        self.graph
            .add_edge(source, target, relationship.relation.clone());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertex names in insertion order.
    pub fn vertex_names(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn edge_list(&self) -> Vec<(usize, usize)> {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index()))
            .collect()
    }

    fn single_community(&self) -> Vec<Community> {
        if self.node_count() == 0 {
            return Vec::new();
        }
        let members = self.vertex_names();
        vec![Community {
            id: 0,
            size: members.len(),
            members,
        }]
    }

    /// Partition the graph into communities.
    ///
    /// Small graphs short-circuit to one community. Communities below the
    /// minimum size are merged into one overflow community appended last.
    /// Partitioner failures degrade to one community; they never propagate.
    pub fn detect_communities(
        &self,
        config: &GraphConfig,
        partitioner: &dyn Partitioner,
    ) -> Vec<Community> {
        let n = self.node_count();
        if n < config.small_graph_threshold {
            debug!(nodes = n, "Small graph, using single community");
            return self.single_community();
        }

        let groups = match self.partition(config, partitioner) {
            Ok(groups) => groups,
            Err(err) => {
                warn!(error = %err, "Community detection failed, using single community fallback");
                return self.single_community();
            }
        };

        let mut regular: Vec<Vec<usize>> = Vec::new();
        let mut overflow: Vec<usize> = Vec::new();
        let mut assigned = vec![false; n];
        for group in groups {
            let members: Vec<usize> = group
                .into_iter()
                .filter(|&v| !std::mem::replace(&mut assigned[v], true))
                .collect();
            if members.is_empty() {
                continue;
            }
            if members.len() >= config.min_community_size {
                regular.push(members);
            } else {
                overflow.extend(members);
            }
        }
        // Anything the partitioner left out still belongs somewhere.
        overflow.extend((0..n).filter(|&v| !assigned[v]));
        if !overflow.is_empty() {
            overflow.sort_unstable();
            regular.push(overflow);
        }

        let communities: Vec<Community> = regular
            .into_iter()
            .enumerate()
            .map(|(id, members)| {
                let members: Vec<String> = members
                    .into_iter()
                    .map(|v| self.graph[NodeIndex::new(v)].clone())
                    .collect();
                Community {
                    id,
                    size: members.len(),
                    members,
                }
            })
            .collect();

        info!(nodes = n, communities = communities.len(), "Communities detected");
        communities
    }

    fn partition(
        &self,
        config: &GraphConfig,
        partitioner: &dyn Partitioner,
    ) -> Result<Vec<Vec<usize>>> {
        let names = self.vertex_names();
        let edges = self.edge_list();
        let validate = |groups: Vec<Vec<usize>>, bound: usize| -> Result<Vec<Vec<usize>>> {
            if groups.iter().flatten().any(|&v| v >= bound) {
                return Err(crate::Error::Partition(
                    "partitioner returned an unknown vertex index".to_string(),
                ));
            }
            Ok(groups)
        };

        match config.partition_mode {
            PartitionMode::WholeGraph => validate(
                partitioner.partition(&names, &edges, config.resolution, config.max_iterations)?,
                names.len(),
            ),
            PartitionMode::PerComponent => {
                let mut components = UnionFind::<usize>::new(names.len());
                for &(u, v) in &edges {
                    components.union(u, v);
                }

                let mut order: Vec<usize> = Vec::new();
                let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
                for vertex in 0..names.len() {
                    let root = components.find(vertex);
                    by_root
                        .entry(root)
                        .or_insert_with(|| {
                            order.push(root);
                            Vec::new()
                        })
                        .push(vertex);
                }

                let mut groups = Vec::new();
                for root in order {
                    let vertices = by_root.remove(&root).unwrap_or_default();
                    let local: HashMap<usize, usize> =
                        vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();
                    let local_names: Vec<String> =
                        vertices.iter().map(|&v| names[v].clone()).collect();
                    let local_edges: Vec<(usize, usize)> = edges
                        .iter()
                        .filter_map(|(u, v)| Some((*local.get(u)?, *local.get(v)?)))
                        .collect();

                    let parts = validate(
                        partitioner.partition(
                            &local_names,
                            &local_edges,
                            config.resolution,
                            config.max_iterations,
                        )?,
                        vertices.len(),
                    )?;
                    groups.extend(
                        parts
                            .into_iter()
                            .map(|part| part.into_iter().map(|i| vertices[i]).collect()),
                    );
                }
                Ok(groups)
            }
        }
    }

    /// Entities and relationships of the subgraph induced by `members`.
    ///
    /// Falls back to the bare member list when any member is not a vertex.
    pub fn describe_community(&self, members: &[String]) -> CommunityDescription {
        let mut indices = HashSet::new();
        for member in members {
            match self.index.get(member) {
                Some(idx) => {
                    indices.insert(*idx);
                }
                None => {
                    warn!(member = %member, "Community member not in graph, describing entities only");
                    return CommunityDescription {
                        entities: members.to_vec(),
                        relationships: Vec::new(),
                    };
                }
            }
        }

        let mut ordered: Vec<NodeIndex> = indices.iter().copied().collect();
        ordered.sort();
        let entities = ordered.iter().map(|idx| self.graph[*idx].clone()).collect();

        let relationships = self
            .graph
            .edge_references()
            .filter(|e| indices.contains(&e.source()) && indices.contains(&e.target()))
            .map(|e| {
                format!(
                    "{} -> {} -> {}",
                    self.graph[e.source()],
                    e.weight(),
                    self.graph[e.target()]
                )
            })
            .collect();

        CommunityDescription {
            entities,
            relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::partition::LouvainPartitioner;
    use crate::Error;

    struct FailingPartitioner;

    impl Partitioner for FailingPartitioner {
        fn partition(
            &self,
            _vertices: &[String],
            _edges: &[(usize, usize)],
            _resolution: f64,
            _max_iterations: usize,
        ) -> Result<Vec<Vec<usize>>> {
            Err(Error::Partition("library crashed".into()))
        }
    }

    /// Returns a fixed grouping regardless of input.
    struct FixedPartitioner(Vec<Vec<usize>>);

    impl Partitioner for FixedPartitioner {
        fn partition(
            &self,
            _vertices: &[String],
            _edges: &[(usize, usize)],
            _resolution: f64,
            _max_iterations: usize,
        ) -> Result<Vec<Vec<usize>>> {
            Ok(self.0.clone())
        }
    }

    fn chain(names: &[&str]) -> String {
        let mut summary = String::from("Entities:\n");
        for name in names {
            summary.push_str(&format!("- {}\n", name));
        }
        summary.push_str("Relationships:\n");
        for pair in names.windows(2) {
            summary.push_str(&format!("{} -> next -> {}\n", pair[0], pair[1]));
        }
        summary
    }

    fn graph_with(n: usize) -> KnowledgeGraph {
        let names: Vec<String> = (0..n).map(|i| format!("E{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        KnowledgeGraph::from_summaries(&[chain(&refs)])
    }

    fn all_members(communities: &[Community]) -> Vec<String> {
        let mut all: Vec<String> = communities
            .iter()
            .flat_map(|c| c.members.clone())
            .collect();
        all.sort();
        all
    }

    #[test]
    fn merges_vertices_by_exact_name() {
        let graph = KnowledgeGraph::from_summaries(&[
            "Entities:\n- Apple Inc.\n- Tim",
            "Relationships:\nTim -> leads -> Apple Inc.\napple inc. -> is -> company",
        ]);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.contains("apple inc."));
    }

    #[test]
    fn small_graph_returns_single_community() {
        let graph = graph_with(9);
        let communities = graph.detect_communities(&GraphConfig::default(), &LouvainPartitioner);

        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].id, 0);
        assert_eq!(communities[0].size, 9);
        assert_eq!(communities[0].members.len(), 9);
    }

    #[test]
    fn empty_graph_has_no_communities() {
        let graph = KnowledgeGraph::new();
        assert!(graph
            .detect_communities(&GraphConfig::default(), &LouvainPartitioner)
            .is_empty());
    }

    #[test]
    fn partition_failure_falls_back_to_single_community() {
        let graph = graph_with(12);
        let communities = graph.detect_communities(&GraphConfig::default(), &FailingPartitioner);

        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].size, 12);
    }

    #[test]
    fn small_groups_merge_into_trailing_overflow() {
        let graph = graph_with(12);
        let partitioner = FixedPartitioner(vec![
            vec![0, 1],
            vec![2, 3, 4, 5],
            vec![6],
            vec![7, 8, 9, 10, 11],
        ]);

        let communities = graph.detect_communities(&GraphConfig::default(), &partitioner);

        assert_eq!(communities.len(), 3);
        assert_eq!(communities[0].members, vec!["E2", "E3", "E4", "E5"]);
        assert_eq!(communities[1].members, vec!["E7", "E8", "E9", "E10", "E11"]);
        assert_eq!(communities[2].members, vec!["E0", "E1", "E6"]);
        assert_eq!(
            communities.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn merge_never_drops_members() {
        let graph = graph_with(15);
        let mut expected = graph.vertex_names();
        expected.sort();

        for min_size in 1..=6 {
            let config = GraphConfig {
                min_community_size: min_size,
                ..GraphConfig::default()
            };
            for partitioner in [
                FixedPartitioner(vec![vec![0, 1, 2], vec![3], vec![4, 5, 6, 7, 8, 9], vec![10, 11]]),
                FixedPartitioner(vec![(0..15).collect()]),
            ] {
                let communities = graph.detect_communities(&config, &partitioner);
                assert_eq!(all_members(&communities), expected, "min_size={}", min_size);
            }
            let communities = graph.detect_communities(&config, &LouvainPartitioner);
            assert_eq!(all_members(&communities), expected, "min_size={}", min_size);
        }
    }

    #[test]
    fn out_of_range_partition_falls_back() {
        let graph = graph_with(10);
        let communities =
            graph.detect_communities(&GraphConfig::default(), &FixedPartitioner(vec![vec![0, 99]]));
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].size, 10);
    }

    #[test]
    fn per_component_mode_partitions_each_component() {
        let mut summaries = vec![chain(&["A0", "A1", "A2", "A3", "A4", "A5"])];
        summaries.push(chain(&["B0", "B1", "B2", "B3", "B4", "B5"]));
        let graph = KnowledgeGraph::from_summaries(&summaries);
        let config = GraphConfig {
            partition_mode: PartitionMode::PerComponent,
            ..GraphConfig::default()
        };

        let communities = graph.detect_communities(&config, &LouvainPartitioner);

        for community in &communities {
            let a = community.members.iter().any(|m| m.starts_with('A'));
            let b = community.members.iter().any(|m| m.starts_with('B'));
            assert!(!(a && b) || community.id == communities.len() - 1);
        }
        assert_eq!(all_members(&communities).len(), 12);
    }

    #[test]
    fn describes_induced_subgraph() {
        let graph = KnowledgeGraph::from_summaries(&[
            "Relationships:\nAlice -> works_at -> Acme\nBob -> knows -> Alice\nAcme -> owns -> Widget",
        ]);

        let description =
            graph.describe_community(&["Alice".to_string(), "Acme".to_string()]);

        assert_eq!(description.entities, vec!["Alice", "Acme"]);
        assert_eq!(description.relationships, vec!["Alice -> works_at -> Acme"]);
    }

    #[test]
    fn unknown_member_falls_back_to_entities_only() {
        let graph = KnowledgeGraph::from_summaries(&["Entities:\n- Alice"]);
        let members = vec!["Alice".to_string(), "Ghost".to_string()];

        let description = graph.describe_community(&members);

        assert_eq!(description.entities, members);
        assert!(description.relationships.is_empty());
    }
}
