//! Criteria the index cannot answer for lineage results
//!
//! Degree exists only in the traversal result and the entity type is read
//! from the urn, so both are evaluated against each candidate in memory.

use crate::models::filter::{Condition, Criterion, Filter};
use crate::models::urn::Urn;

pub const DEGREE_FIELD: &str = "degree";

const ENTITY_TYPE_FIELDS: [&str; 2] = ["_entityType", "entityType"];

/// Whether `criterion` is evaluated in memory instead of by the index
pub fn is_lineage_criterion(criterion: &Criterion) -> bool {
    let field = criterion.base_field();
    field == DEGREE_FIELD || ENTITY_TYPE_FIELDS.contains(&field)
}

/// One disjunct of a filter, split by who evaluates each criterion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    /// Evaluated against the candidate's urn and degree
    pub lineage: Vec<Criterion>,
    /// Sent to the index
    pub index: Vec<Criterion>,
}

impl Branch {
    /// Whether the candidate satisfies every in-memory criterion of this branch
    pub fn admits(&self, urn: &Urn, degree: u32) -> bool {
        self.lineage
            .iter()
            .all(|criterion| criterion_matches(criterion, urn, degree))
    }
}

/// Branches of `filter`; an empty filter is one branch without criteria.
///
/// A candidate matches the filter when some single branch admits it and the
/// index matches that same branch's index criteria.
pub fn branches(filter: &Filter) -> Vec<Branch> {
    if filter.or.is_empty() {
        return vec![Branch::default()];
    }
    let (lineage, index) = filter.partition(is_lineage_criterion);
    lineage
        .or
        .into_iter()
        .zip(index.or)
        .map(|(lineage, index)| Branch {
            lineage: lineage.and,
            index: index.and,
        })
        .collect()
}

fn criterion_matches(criterion: &Criterion, urn: &Urn, degree: u32) -> bool {
    let outcome = if criterion.base_field() == DEGREE_FIELD {
        degree_matches(criterion, degree)
    } else {
        text_matches(criterion, urn.entity_type())
    };
    outcome != criterion.negated
}

/// `"3+"` stands for three hops or more
fn degree_value_matches(value: &str, degree: u32) -> bool {
    let value = value.trim();
    match value.strip_suffix('+') {
        Some(min) => min.trim().parse::<u32>().map_or(false, |min| degree >= min),
        None => value.parse::<u32>().map_or(false, |exact| degree == exact),
    }
}

fn degree_matches(criterion: &Criterion, degree: u32) -> bool {
    let values = criterion.effective_values();
    let bound = || {
        values
            .first()
            .and_then(|value| value.trim().trim_end_matches('+').parse::<u32>().ok())
    };
    match criterion.condition {
        Condition::Exists => true,
        Condition::IsNull => false,
        Condition::GreaterThan => bound().map_or(false, |b| degree > b),
        Condition::GreaterThanOrEqualTo => bound().map_or(false, |b| degree >= b),
        Condition::LessThan => bound().map_or(false, |b| degree < b),
        Condition::LessThanOrEqualTo => bound().map_or(false, |b| degree <= b),
        _ => values
            .iter()
            .any(|value| degree_value_matches(value, degree)),
    }
}

fn text_matches(criterion: &Criterion, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return criterion.condition == Condition::IsNull;
    };
    let actual = actual.to_lowercase();
    let values: Vec<String> = criterion
        .effective_values()
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    match criterion.condition {
        Condition::Exists => true,
        Condition::IsNull => false,
        Condition::Contain => values.iter().any(|v| actual.contains(v.as_str())),
        Condition::StartWith => values.iter().any(|v| actual.starts_with(v.as_str())),
        Condition::EndWith => values.iter().any(|v| actual.ends_with(v.as_str())),
        Condition::GreaterThan => values.iter().any(|v| actual > *v),
        Condition::GreaterThanOrEqualTo => values.iter().any(|v| actual >= *v),
        Condition::LessThan => values.iter().any(|v| actual < *v),
        Condition::LessThanOrEqualTo => values.iter().any(|v| actual <= *v),
        Condition::Equal | Condition::In => values.iter().any(|v| *v == actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filter::ConjunctiveCriterion;

    fn dataset() -> Urn {
        Urn::new("urn:li:dataset:(urn:li:dataPlatform:hive,db.t,PROD)")
    }

    fn admits(filter: &Filter, urn: &Urn, degree: u32) -> bool {
        branches(filter).iter().any(|branch| branch.admits(urn, degree))
    }

    #[test]
    fn test_degree_equality_and_plus() {
        let urn = dataset();
        assert!(admits(&Filter::new_filter("degree.keyword", "1"), &urn, 1));
        assert!(!admits(&Filter::new_filter("degree.keyword", "2"), &urn, 1));

        let three_plus = Filter::and(vec![
            Criterion::new("degree", Condition::In).with_values(["1", "3+"]),
        ]);
        assert!(admits(&three_plus, &urn, 1));
        assert!(!admits(&three_plus, &urn, 2));
        assert!(admits(&three_plus, &urn, 7));
    }

    #[test]
    fn test_degree_comparisons_and_negation() {
        let urn = dataset();
        let above_one = Filter::and(vec![
            Criterion::new("degree", Condition::GreaterThan).with_value("1"),
        ]);
        assert!(admits(&above_one, &urn, 2));
        assert!(!admits(&above_one, &urn, 1));

        let not_one = Filter::and(vec![Criterion::equal("degree", "1").negate()]);
        assert!(!admits(&not_one, &urn, 1));
        assert!(admits(&not_one, &urn, 2));
    }

    #[test]
    fn test_entity_type_read_from_urn() {
        let urn = dataset();
        assert!(admits(&Filter::new_filter("_entityType", "DATASET"), &urn, 1));
        assert!(!admits(&Filter::new_filter("entityType", "chart"), &urn, 1));
    }

    #[test]
    fn test_branches_keep_index_criteria_with_their_conjunct() {
        let filter = Filter {
            or: vec![
                ConjunctiveCriterion::new(vec![Criterion::equal("degree", "1")]),
                ConjunctiveCriterion::new(vec![Criterion::equal("platform", "hive")]),
            ],
        };
        let branches = branches(&filter);
        assert_eq!(branches.len(), 2);
        assert!(branches[0].index.is_empty());
        assert!(!branches[0].admits(&dataset(), 2));
        // The index-only branch admits every candidate but still carries its index criterion
        assert!(branches[1].admits(&dataset(), 2));
        assert_eq!(branches[1].index[0].field, "platform");
        assert!(is_lineage_criterion(&Criterion::equal("_entityType", "dataset")));
    }

    #[test]
    fn test_empty_filter_is_one_open_branch() {
        let branches = branches(&Filter::default());
        assert_eq!(branches, vec![Branch::default()]);
        assert!(branches[0].admits(&dataset(), 5));
    }
}
