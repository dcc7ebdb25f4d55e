//! Filter compilation
//!
//! A DNF [`Filter`] becomes
//!
//! ```text
//! bool {
//!   should: [ bool { must: [criterion, ...] }, ... ]   (minimum_should_match 1)
//!   must_not: [ match removed "true" ]                  (unless `removed` is constrained)
//! }
//! ```

use crate::error::Result;
use crate::models::entity::EntitySpec;
use crate::models::filter::{Condition, Criterion, Filter};
use crate::query::compiler::URN_FIELD;
use crate::query::dsl::{BoolQuery, QueryNode, RangeBounds};

pub const KEYWORD_SUFFIX: &str = ".keyword";
pub const REMOVED_FIELD: &str = "removed";

/// Canonical fields that have a user-edited mirror
const EDITABLE_FIELD_PAIRS: &[(&str, &str)] = &[
    ("fieldTags", "editedFieldTags"),
    ("fieldGlossaryTerms", "editedFieldGlossaryTerms"),
    ("fieldDescriptions", "editedFieldDescriptions"),
    ("description", "editedDescription"),
    ("tags", "editedTags"),
];

/// Mirror of `field`, from the entity spec first and the static pairs second
pub fn edited_field_for(spec: Option<&EntitySpec>, field: &str) -> Option<String> {
    if let Some(edited) = spec
        .and_then(|spec| spec.field(field))
        .and_then(|field| field.edited_field.clone())
    {
        return Some(edited);
    }
    EDITABLE_FIELD_PAIRS
        .iter()
        .find(|(canonical, _)| *canonical == field)
        .map(|(_, edited)| edited.to_string())
}

/// `field.keyword` unless it already ends with it
pub fn keyword_field(field: &str) -> String {
    if field.ends_with(KEYWORD_SUFFIX) {
        field.to_string()
    } else {
        format!("{}{}", field, KEYWORD_SUFFIX)
    }
}

/// Compile the caller's filter, injecting the soft-delete exclusion
pub fn compile_filter(filter: &Filter, spec: Option<&EntitySpec>) -> Result<QueryNode> {
    filter.validate()?;

    let mut root = BoolQuery::new();
    // An empty conjunct is true, which makes the whole disjunction true
    if !filter.or.iter().any(|conjunct| conjunct.and.is_empty()) {
        for conjunct in &filter.or {
            let mut and_query = BoolQuery::new();
            for criterion in &conjunct.and {
                and_query = and_query.must(compile_criterion(criterion, spec));
            }
            root = root.should(and_query.into_node());
        }
        if !root.should.is_empty() {
            root = root.minimum_should_match(1);
        }
    }

    if !filter.constrains(REMOVED_FIELD) {
        root = root.must_not(QueryNode::Match {
            field: REMOVED_FIELD.to_string(),
            query: "true".to_string(),
        });
    }

    Ok(root.into_node())
}

/// Compile one criterion; unknown fields are queried as-is
pub fn compile_criterion(criterion: &Criterion, spec: Option<&EntitySpec>) -> QueryNode {
    let clause = compile_condition(criterion, spec);
    if criterion.negated {
        BoolQuery::new().must_not(clause).into_node()
    } else {
        clause
    }
}

fn compile_condition(criterion: &Criterion, spec: Option<&EntitySpec>) -> QueryNode {
    let field = criterion.field.as_str();
    let values: Vec<String> = criterion
        .effective_values()
        .into_iter()
        .map(str::to_string)
        .collect();
    let first = values.first().cloned().unwrap_or_default();

    match criterion.condition {
        Condition::Equal | Condition::In => compile_equality(criterion, spec, values),
        Condition::Contain => QueryNode::Wildcard {
            field: keyword_field(field),
            value: format!("*{}*", first),
        },
        Condition::StartWith => QueryNode::Wildcard {
            field: keyword_field(field),
            value: format!("{}*", first),
        },
        Condition::EndWith => QueryNode::Wildcard {
            field: keyword_field(field),
            value: format!("*{}", first),
        },
        Condition::GreaterThan => range(field, RangeBounds { gt: Some(first), ..Default::default() }),
        Condition::GreaterThanOrEqualTo => {
            range(field, RangeBounds { gte: Some(first), ..Default::default() })
        }
        Condition::LessThan => range(field, RangeBounds { lt: Some(first), ..Default::default() }),
        Condition::LessThanOrEqualTo => {
            range(field, RangeBounds { lte: Some(first), ..Default::default() })
        }
        Condition::Exists => QueryNode::Exists {
            field: field.to_string(),
        },
        Condition::IsNull => BoolQuery::new()
            .must_not(QueryNode::Exists {
                field: field.to_string(),
            })
            .into_node(),
    }
}

fn range(field: &str, bounds: RangeBounds) -> QueryNode {
    QueryNode::Range {
        field: field.to_string(),
        bounds,
    }
}

fn compile_equality(criterion: &Criterion, spec: Option<&EntitySpec>, values: Vec<String>) -> QueryNode {
    let base = criterion.base_field();
    if base == URN_FIELD {
        return QueryNode::terms(URN_FIELD, values);
    }

    if let Some(edited) = edited_field_for(spec, base) {
        let fields = [keyword_field(base), keyword_field(&edited)];
        let mut either = BoolQuery::new();
        if values.len() >= 2 {
            for field in fields {
                either = either.should(QueryNode::terms(field, values.clone()));
            }
        } else {
            let value = values.into_iter().next().unwrap_or_default();
            for field in fields {
                either = either.should(
                    BoolQuery::new()
                        .should(QueryNode::MultiMatch {
                            query: value.clone(),
                            fields: vec![(field, 1.0)],
                        })
                        .into_node(),
                );
            }
        }
        return either.minimum_should_match(1).into_node();
    }

    if values.len() >= 2 {
        return QueryNode::terms(keyword_field(&criterion.field), values);
    }

    let value = values.into_iter().next().unwrap_or_default();
    if criterion.field.ends_with(KEYWORD_SUFFIX) {
        return QueryNode::term(criterion.field.clone(), value);
    }
    BoolQuery::new()
        .should(QueryNode::MultiMatch {
            query: value,
            fields: vec![
                (criterion.field.clone(), 1.0),
                (format!("{}.*", criterion.field), 1.0),
            ],
        })
        .into_node()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::{FieldType, SearchableField};
    use crate::models::filter::ConjunctiveCriterion;

    fn root_bool(node: &QueryNode) -> &BoolQuery {
        match node {
            QueryNode::Bool(bool_query) => bool_query,
            other => panic!("expected bool, got {:?}", other),
        }
    }

    fn criterion_clause(node: &QueryNode) -> &QueryNode {
        let root = root_bool(node);
        let conjunct = root_bool(&root.should[0]);
        &conjunct.must[0]
    }

    #[test]
    fn test_removed_injected_by_default() {
        let compiled = compile_filter(&Filter::new_filter("keyword", "some value"), None).unwrap();
        let root = root_bool(&compiled);
        assert_eq!(
            root.must_not,
            vec![QueryNode::Match {
                field: "removed".to_string(),
                query: "true".to_string()
            }]
        );

        let empty = compile_filter(&Filter::default(), None).unwrap();
        assert_eq!(root_bool(&empty).must_not.len(), 1);
        assert!(root_bool(&empty).should.is_empty());
    }

    #[test]
    fn test_explicit_removed_suppresses_injection() {
        let filter = Filter::and(vec![
            Criterion::equal("keyword", "some value"),
            Criterion::equal("removed", "true"),
        ]);
        let compiled = compile_filter(&filter, None).unwrap();
        assert!(root_bool(&compiled).must_not.is_empty());
    }

    #[test]
    fn test_editable_pair_with_values_emits_two_terms() {
        let filter = Filter::and(vec![
            Criterion::new("fieldTags", Condition::Equal).with_values(["v1", "v2"])
        ]);
        let compiled = compile_filter(&filter, None).unwrap();
        let either = root_bool(criterion_clause(&compiled));

        let terms: Vec<_> = either
            .should
            .iter()
            .filter_map(|clause| match clause {
                QueryNode::Terms { field, values } => Some((field.as_str(), values.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(terms.len(), 2);
        assert!(terms.contains(&("fieldTags.keyword", vec!["v1".to_string(), "v2".to_string()])));
        assert!(terms.contains(&(
            "editedFieldTags.keyword",
            vec!["v1".to_string(), "v2".to_string()]
        )));
    }

    #[test]
    fn test_editable_pair_with_single_value_emits_multi_match_per_variant() {
        let filter = Filter::new_filter("fieldTags", "v1");
        let compiled = compile_filter(&filter, None).unwrap();
        let either = root_bool(criterion_clause(&compiled));

        let mut fields = Vec::new();
        for variant in &either.should {
            for clause in &root_bool(variant).should {
                if let QueryNode::MultiMatch { query, fields: f } = clause {
                    assert_eq!(query, "v1");
                    fields.extend(f.iter().map(|(name, boost)| (name.clone(), *boost)));
                }
            }
        }
        assert_eq!(
            fields,
            vec![
                ("fieldTags.keyword".to_string(), 1.0),
                ("editedFieldTags.keyword".to_string(), 1.0)
            ]
        );
    }

    #[test]
    fn test_spec_declared_pair() {
        let spec = EntitySpec::new(
            "chart",
            vec![SearchableField::new("owners", FieldType::Keyword).edited_as("editedOwners")],
        );
        assert_eq!(
            edited_field_for(Some(&spec), "owners").as_deref(),
            Some("editedOwners")
        );
        assert_eq!(edited_field_for(None, "tags").as_deref(), Some("editedTags"));
        assert_eq!(edited_field_for(None, "platform"), None);
    }

    #[test]
    fn test_plain_field_single_value_is_multi_match() {
        let compiled = compile_filter(&Filter::new_filter("platform", "mysql"), None).unwrap();
        let wrapper = root_bool(criterion_clause(&compiled));
        assert_eq!(
            wrapper.should,
            vec![QueryNode::MultiMatch {
                query: "mysql".to_string(),
                fields: vec![("platform".to_string(), 1.0), ("platform.*".to_string(), 1.0)],
            }]
        );
    }

    #[test]
    fn test_plain_field_multiple_values_is_terms_on_keyword() {
        let filter = Filter::and(vec![
            Criterion::new("platform", Condition::In).with_values(["mysql", "bigquery"])
        ]);
        let compiled = compile_filter(&filter, None).unwrap();
        assert_eq!(
            criterion_clause(&compiled),
            &QueryNode::terms(
                "platform.keyword",
                vec!["mysql".to_string(), "bigquery".to_string()]
            )
        );
    }

    #[test]
    fn test_urn_values_are_exact_terms() {
        let single = compile_criterion(&Criterion::equal("urn", "urn:li:chart:(looker,a)"), None);
        assert_eq!(
            single,
            QueryNode::terms("urn", vec!["urn:li:chart:(looker,a)".to_string()])
        );

        let many = compile_criterion(
            &Criterion::new("urn", Condition::In).with_values(["urn:li:chart:(looker,a)", "urn:li:chart:(looker,b)"]),
            None,
        );
        assert!(matches!(many, QueryNode::Terms { ref field, ref values } if field == "urn" && values.len() == 2));
    }

    #[test]
    fn test_conditions() {
        let contain = compile_criterion(
            &Criterion::new("name", Condition::Contain).with_value("sales"),
            None,
        );
        assert_eq!(
            contain,
            QueryNode::Wildcard {
                field: "name.keyword".to_string(),
                value: "*sales*".to_string()
            }
        );

        let gt = compile_criterion(
            &Criterion::new("createdAt", Condition::GreaterThan).with_value("10"),
            None,
        );
        assert!(matches!(gt, QueryNode::Range { ref bounds, .. } if bounds.gt.as_deref() == Some("10")));

        let negated = compile_criterion(&Criterion::new("owners", Condition::Exists).negate(), None);
        assert_eq!(root_bool(&negated).must_not.len(), 1);
    }

    #[test]
    fn test_disjunction_of_conjuncts() {
        let filter = Filter {
            or: vec![
                ConjunctiveCriterion::new(vec![Criterion::equal("platform", "hive")]),
                ConjunctiveCriterion::new(vec![Criterion::equal("platform", "kafka")]),
            ],
        };
        let compiled = compile_filter(&filter, None).unwrap();
        let root = root_bool(&compiled);
        assert_eq!(root.should.len(), 2);
        assert_eq!(root.minimum_should_match, Some(1));
    }

    #[test]
    fn test_empty_conjunct_matches_everything() {
        let mut filter = Filter::new_filter("platform", "hive");
        filter.or.push(ConjunctiveCriterion::default());
        let compiled = compile_filter(&filter, None).unwrap();
        let root = root_bool(&compiled);
        assert!(root.should.is_empty());
        assert_eq!(root.must_not.len(), 1);
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let filter = Filter::and(vec![Criterion::new("platform", Condition::Equal)]);
        assert!(compile_filter(&filter, None).is_err());
    }
}
