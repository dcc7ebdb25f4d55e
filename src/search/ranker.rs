use std::cmp::Ordering;

use crate::models::result::{LineageSearchEntity, SearchEntity};

/// Orders merged results
pub trait Ranker: Send + Sync {
    fn rank(&self, entities: Vec<SearchEntity>) -> Vec<SearchEntity>;

    fn rank_lineage(&self, entities: Vec<LineageSearchEntity>) -> Vec<LineageSearchEntity>;
}

fn by_score(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

/// Keeps index relevance order: score descending, then degree, then urn
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRanker;

impl Ranker for SimpleRanker {
    fn rank(&self, mut entities: Vec<SearchEntity>) -> Vec<SearchEntity> {
        entities.sort_by(|a, b| by_score(a.score, b.score).then_with(|| a.urn.cmp(&b.urn)));
        entities
    }

    fn rank_lineage(&self, mut entities: Vec<LineageSearchEntity>) -> Vec<LineageSearchEntity> {
        entities.sort_by(|a, b| {
            by_score(a.score, b.score)
                .then_with(|| a.degree.cmp(&b.degree))
                .then_with(|| a.urn.cmp(&b.urn))
        });
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::urn::Urn;

    fn lineage(urn: &str, degree: u32, score: f32) -> LineageSearchEntity {
        LineageSearchEntity {
            urn: Urn::new(urn),
            degree,
            score,
            matched_fields: Vec::new(),
        }
    }

    #[test]
    fn test_rank_by_score_then_urn() {
        let ranked = SimpleRanker.rank(vec![
            SearchEntity::new(Urn::new("urn:li:chart:b"), 1.0),
            SearchEntity::new(Urn::new("urn:li:chart:c"), 2.0),
            SearchEntity::new(Urn::new("urn:li:chart:a"), 1.0),
        ]);
        let urns: Vec<_> = ranked.iter().map(|e| e.urn.as_str()).collect();
        assert_eq!(urns, vec!["urn:li:chart:c", "urn:li:chart:a", "urn:li:chart:b"]);
    }

    #[test]
    fn test_lineage_ties_break_by_degree_then_urn() {
        let ranked = SimpleRanker.rank_lineage(vec![
            lineage("urn:li:dataset:b", 2, 1.0),
            lineage("urn:li:dataset:c", 1, 1.0),
            lineage("urn:li:dataset:a", 2, 1.0),
            lineage("urn:li:dataset:z", 3, 5.0),
        ]);
        let urns: Vec<_> = ranked.iter().map(|e| e.urn.as_str()).collect();
        assert_eq!(
            urns,
            vec!["urn:li:dataset:z", "urn:li:dataset:c", "urn:li:dataset:a", "urn:li:dataset:b"]
        );
    }
}
