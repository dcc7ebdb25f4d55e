//! Disjunctive-normal-form filters
//!
//! A [`Filter`] is an OR of [`ConjunctiveCriterion`]s, each of which is an AND
//! of [`Criterion`]s. An empty filter matches everything.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, SearchError};

/// Comparison applied by a single criterion
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    #[default]
    Equal,
    In,
    Contain,
    StartWith,
    EndWith,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Exists,
    IsNull,
}

impl Condition {
    /// Conditions that test presence only and carry no value
    pub fn is_unary(&self) -> bool {
        matches!(self, Condition::Exists | Condition::IsNull)
    }
}

/// A single field predicate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Criterion {
    pub field: String,

    #[serde(default)]
    pub condition: Condition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// IN-list; authoritative over `value` when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default)]
    pub negated: bool,
}

impl Criterion {
    pub fn new(field: impl Into<String>, condition: Condition) -> Self {
        Self {
            field: field.into(),
            condition,
            ..Default::default()
        }
    }

    /// `field == value`
    pub fn equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Condition::Equal).with_value(value)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// The values this criterion compares against, `values` taking precedence
    pub fn effective_values(&self) -> Vec<&str> {
        if !self.values.is_empty() {
            self.values.iter().map(String::as_str).collect()
        } else {
            self.value.iter().map(String::as_str).collect()
        }
    }

    /// Field name without a trailing `.keyword`
    pub fn base_field(&self) -> &str {
        self.field.strip_suffix(".keyword").unwrap_or(&self.field)
    }

    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(SearchError::invalid("criterion field must not be empty"));
        }
        if !self.condition.is_unary() && self.value.is_none() && self.values.is_empty() {
            return Err(SearchError::invalid(format!(
                "criterion on '{}' with condition {} has neither value nor values",
                self.field, self.condition
            )));
        }
        Ok(())
    }
}

/// AND of criteria
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ConjunctiveCriterion {
    #[serde(default)]
    pub and: Vec<Criterion>,
}

impl ConjunctiveCriterion {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { and: criteria }
    }
}

/// OR of conjunctive criteria
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Filter {
    #[serde(default)]
    pub or: Vec<ConjunctiveCriterion>,
}

impl Filter {
    /// Filter with a single `field == value` criterion
    pub fn new_filter(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::and(vec![Criterion::equal(field, value)])
    }

    /// Filter with a single conjunct
    pub fn and(criteria: Vec<Criterion>) -> Self {
        Self {
            or: vec![ConjunctiveCriterion::new(criteria)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.or.iter().all(|conjunct| conjunct.and.is_empty())
    }

    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.or.iter().flat_map(|conjunct| conjunct.and.iter())
    }

    /// Whether any criterion constrains `field` (ignoring a `.keyword` suffix)
    pub fn constrains(&self, field: &str) -> bool {
        self.criteria().any(|criterion| criterion.base_field() == field)
    }

    pub fn validate(&self) -> Result<()> {
        self.criteria().try_for_each(Criterion::validate)
    }

    /// Split into (criteria matching `predicate`, remaining criteria), conjunct by conjunct.
    ///
    /// Both halves keep one conjunct per original conjunct so that conjunct
    /// positions line up.
    pub fn partition<P>(&self, predicate: P) -> (Filter, Filter)
    where
        P: Fn(&Criterion) -> bool,
    {
        let mut matching = Filter::default();
        let mut rest = Filter::default();
        for conjunct in &self.or {
            let (yes, no): (Vec<_>, Vec<_>) =
                conjunct.and.iter().cloned().partition(|criterion| predicate(criterion));
            matching.or.push(ConjunctiveCriterion::new(yes));
            rest.or.push(ConjunctiveCriterion::new(no));
        }
        (matching, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_strings() {
        assert_eq!(Condition::GreaterThanOrEqualTo.to_string(), "GREATER_THAN_OR_EQUAL_TO");
        assert_eq!("START_WITH".parse::<Condition>().unwrap(), Condition::StartWith);
    }

    #[test]
    fn test_criterion_validation() {
        assert!(Criterion::equal("platform", "mysql").validate().is_ok());
        assert!(Criterion::new("platform", Condition::Exists).validate().is_ok());

        let err = Criterion::new("platform", Condition::Equal).validate().unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[test]
    fn test_effective_values_prefers_list() {
        let criterion = Criterion::equal("platform", "mysql").with_values(["mysql", "bigquery"]);
        assert_eq!(criterion.effective_values(), vec!["mysql", "bigquery"]);
    }

    #[test]
    fn test_constrains_ignores_keyword_suffix() {
        let filter = Filter::new_filter("degree.keyword", "1");
        assert!(filter.constrains("degree"));
        assert!(!filter.constrains("removed"));
        assert!(Filter::default().is_empty());
    }

    #[test]
    fn test_partition_keeps_conjunct_alignment() {
        let filter = Filter {
            or: vec![
                ConjunctiveCriterion::new(vec![
                    Criterion::equal("degree", "1"),
                    Criterion::equal("platform", "hive"),
                ]),
                ConjunctiveCriterion::new(vec![Criterion::equal("platform", "kafka")]),
            ],
        };

        let (degree, rest) = filter.partition(|c| c.base_field() == "degree");
        assert_eq!(degree.or.len(), 2);
        assert_eq!(rest.or.len(), 2);
        assert_eq!(degree.or[0].and.len(), 1);
        assert!(degree.or[1].and.is_empty());
        assert_eq!(rest.or[1].and[0].value.as_deref(), Some("kafka"));
    }
}
