use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::urn::Urn;

/// One reachable entity as reported by the graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LineageRelationship {
    pub entity: Urn,

    /// Hop distance from the root
    pub degree: u32,

    #[serde(rename = "type")]
    pub relationship_type: String,
}

impl LineageRelationship {
    pub fn new(entity: Urn, degree: u32, relationship_type: impl Into<String>) -> Self {
        Self {
            entity,
            degree,
            relationship_type: relationship_type.into(),
        }
    }
}

/// A page of relationships from the graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityLineageResult {
    pub start: usize,
    pub count: usize,
    pub total: usize,
    pub relationships: Vec<LineageRelationship>,
}

impl EntityLineageResult {
    pub fn new(relationships: Vec<LineageRelationship>) -> Self {
        let total = relationships.len();
        Self {
            start: 0,
            count: total,
            total,
            relationships,
        }
    }

    /// Candidate urns with their smallest degree, in first-seen order
    pub fn candidates(&self) -> Vec<(Urn, u32)> {
        let mut order: Vec<Urn> = Vec::new();
        let mut degrees: HashMap<&Urn, u32> = HashMap::new();
        for relationship in &self.relationships {
            degrees
                .entry(&relationship.entity)
                .and_modify(|degree| *degree = (*degree).min(relationship.degree))
                .or_insert_with(|| {
                    order.push(relationship.entity.clone());
                    relationship.degree
                });
        }
        order
            .into_iter()
            .map(|urn| {
                let degree = degrees.get(&urn).copied().unwrap_or_default();
                (urn, degree)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_keep_min_degree() {
        let a = Urn::new("urn:li:dataset:a");
        let b = Urn::new("urn:li:dataset:b");
        let result = EntityLineageResult::new(vec![
            LineageRelationship::new(a.clone(), 3, "DownstreamOf"),
            LineageRelationship::new(b.clone(), 1, "DownstreamOf"),
            LineageRelationship::new(a.clone(), 2, "Consumes"),
        ]);

        assert_eq!(result.candidates(), vec![(a, 2), (b, 1)]);
        assert_eq!(result.total, 3);
    }
}
