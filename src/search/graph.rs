//! Graph traversal collaborator

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::models::lineage::{EntityLineageResult, LineageRelationship};
use crate::models::request::LineageDirection;
use crate::models::urn::Urn;

/// One lineage traversal request
#[derive(Debug, Clone, PartialEq)]
pub struct LineageQuery {
    pub root: Urn,
    pub direction: LineageDirection,
    pub offset: usize,
    pub count: usize,
    /// Hop bound; `None` lets the graph apply its own bound
    pub max_hops: Option<u32>,
    pub start_time_millis: Option<i64>,
    pub end_time_millis: Option<i64>,
}

/// Computes the entities reachable from a root
#[async_trait]
pub trait GraphTraversal: Send + Sync {
    async fn get_lineage(&self, query: &LineageQuery) -> Result<EntityLineageResult>;
}

#[derive(Debug, Clone)]
struct Edge {
    target: Urn,
    relationship_type: String,
    created_at_millis: Option<i64>,
}

#[derive(Debug, Default)]
struct Adjacency {
    downstream: HashMap<Urn, Vec<Edge>>,
    upstream: HashMap<Urn, Vec<Edge>>,
}

/// Adjacency-list graph kept in memory; both directions of an edge change under one lock
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    adjacency: RwLock<Adjacency>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `downstream` is produced from `upstream`
    pub fn add_edge(
        &self,
        upstream: &Urn,
        downstream: &Urn,
        relationship_type: &str,
        created_at_millis: Option<i64>,
    ) {
        let mut adjacency = self.adjacency.write();
        adjacency.downstream.entry(upstream.clone()).or_default().push(Edge {
            target: downstream.clone(),
            relationship_type: relationship_type.to_string(),
            created_at_millis,
        });
        adjacency.upstream.entry(downstream.clone()).or_default().push(Edge {
            target: upstream.clone(),
            relationship_type: relationship_type.to_string(),
            created_at_millis,
        });
    }

    fn in_window(edge: &Edge, query: &LineageQuery) -> bool {
        let Some(created) = edge.created_at_millis else {
            return true;
        };
        query.start_time_millis.map_or(true, |start| created >= start)
            && query.end_time_millis.map_or(true, |end| created <= end)
    }
}

#[async_trait]
impl GraphTraversal for InMemoryGraph {
    async fn get_lineage(&self, query: &LineageQuery) -> Result<EntityLineageResult> {
        let graph = self.adjacency.read();
        let adjacency = match query.direction {
            LineageDirection::Downstream => &graph.downstream,
            LineageDirection::Upstream => &graph.upstream,
        };
        let max_hops = query.max_hops.unwrap_or(u32::MAX);

        // Breadth-first, so the first visit of an entity carries its smallest degree
        let mut visited: HashSet<Urn> = HashSet::from([query.root.clone()]);
        let mut frontier: VecDeque<(Urn, u32)> = VecDeque::from([(query.root.clone(), 0)]);
        let mut relationships = Vec::new();
        while let Some((urn, degree)) = frontier.pop_front() {
            if degree >= max_hops {
                continue;
            }
            let Some(edges) = adjacency.get(&urn) else {
                continue;
            };
            for edge in edges.iter().filter(|edge| Self::in_window(edge, query)) {
                if visited.insert(edge.target.clone()) {
                    relationships.push(LineageRelationship::new(
                        edge.target.clone(),
                        degree + 1,
                        edge.relationship_type.clone(),
                    ));
                    frontier.push_back((edge.target.clone(), degree + 1));
                }
            }
        }

        drop(graph);

        let total = relationships.len();
        let page: Vec<LineageRelationship> = relationships
            .into_iter()
            .skip(query.offset)
            .take(query.count)
            .collect();
        Ok(EntityLineageResult {
            start: query.offset,
            count: page.len(),
            total,
            relationships: page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::new(format!("urn:li:dataset:{}", name))
    }

    fn query(root: &str, direction: LineageDirection, max_hops: Option<u32>) -> LineageQuery {
        LineageQuery {
            root: urn(root),
            direction,
            offset: 0,
            count: 100,
            max_hops,
            start_time_millis: None,
            end_time_millis: None,
        }
    }

    fn graph() -> InMemoryGraph {
        let graph = InMemoryGraph::new();
        graph.add_edge(&urn("a"), &urn("b"), "DownstreamOf", Some(100));
        graph.add_edge(&urn("b"), &urn("c"), "DownstreamOf", Some(200));
        graph.add_edge(&urn("a"), &urn("c"), "DownstreamOf", Some(300));
        graph
    }

    #[tokio::test]
    async fn test_degrees_are_shortest_hops() {
        let result = graph()
            .get_lineage(&query("a", LineageDirection::Downstream, None))
            .await
            .unwrap();
        assert_eq!(result.total, 2);
        let degrees: Vec<_> = result.candidates().into_iter().map(|(_, d)| d).collect();
        assert_eq!(degrees, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_max_hops_and_direction() {
        let graph = InMemoryGraph::new();
        graph.add_edge(&urn("a"), &urn("b"), "DownstreamOf", None);
        graph.add_edge(&urn("b"), &urn("c"), "DownstreamOf", None);

        let one_hop = graph
            .get_lineage(&query("a", LineageDirection::Downstream, Some(1)))
            .await
            .unwrap();
        assert_eq!(one_hop.total, 1);

        let upstream = graph
            .get_lineage(&query("c", LineageDirection::Upstream, None))
            .await
            .unwrap();
        assert_eq!(upstream.total, 2);
        assert_eq!(upstream.relationships[1].degree, 2);
    }

    #[tokio::test]
    async fn test_time_window_filters_edges() {
        let mut windowed = query("a", LineageDirection::Downstream, None);
        windowed.start_time_millis = Some(150);
        windowed.end_time_millis = Some(250);
        let result = graph().get_lineage(&windowed).await.unwrap();
        assert_eq!(result.total, 0);
    }
}
