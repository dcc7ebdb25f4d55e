//! Document field access shared by the embedded engines

use serde_json::Value;
use std::cmp::Ordering;

/// How a query addresses a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldVariant {
    /// Analyzed text
    Text,
    /// `f.keyword`: the raw value
    Keyword,
    /// `f.*`: any subfield
    Any,
}

/// Split a query field name into its document field and variant
pub fn resolve_field(field: &str) -> (&str, FieldVariant) {
    if let Some(base) = field.strip_suffix(".keyword") {
        (base, FieldVariant::Keyword)
    } else if let Some(base) = field.strip_suffix(".*") {
        (base, FieldVariant::Any)
    } else if let Some(base) = field
        .strip_suffix(".delimited")
        .or_else(|| field.strip_suffix(".ngram"))
    {
        (base, FieldVariant::Text)
    } else {
        (field, FieldVariant::Text)
    }
}

/// Values of `field` in a document source, flattened to strings.
///
/// Looks up the literal key first, then a dotted path.
pub fn field_values(source: &Value, field: &str) -> Vec<String> {
    let value = match source.get(field) {
        Some(value) => Some(value),
        None if field.contains('.') => field
            .split('.')
            .try_fold(source, |current, segment| current.get(segment)),
        None => None,
    };

    let mut values = Vec::new();
    if let Some(value) = value {
        flatten(value, &mut values);
    }
    values
}

fn flatten(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::String(s) => out.push(format!("{}={}", key, s)),
                    other => flatten(other, out),
                }
            }
        }
    }
}

/// Lower-cased alphanumeric tokens (underscores kept)
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Total order over sort values: numbers before strings, nulls compare equal here
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Compare strings numerically when both parse as numbers
pub fn compare_scalars(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_field() {
        assert_eq!(resolve_field("platform.keyword"), ("platform", FieldVariant::Keyword));
        assert_eq!(resolve_field("platform.*"), ("platform", FieldVariant::Any));
        assert_eq!(resolve_field("name.delimited"), ("name", FieldVariant::Text));
        assert_eq!(resolve_field("name"), ("name", FieldVariant::Text));
    }

    #[test]
    fn test_field_values() {
        let doc = json!({
            "urn": "urn:li:chart:1",
            "tags": ["a", "b"],
            "removed": false,
            "owner": { "name": "jdoe" },
            "customProperties": { "team": "data" },
            "missing": null,
        });
        assert_eq!(field_values(&doc, "tags"), vec!["a", "b"]);
        assert_eq!(field_values(&doc, "removed"), vec!["false"]);
        assert_eq!(field_values(&doc, "owner.name"), vec!["jdoe"]);
        assert_eq!(field_values(&doc, "customProperties"), vec!["team=data"]);
        assert!(field_values(&doc, "missing").is_empty());
        assert!(field_values(&doc, "nope").is_empty());
    }

    #[test]
    fn test_tokenize_urn() {
        assert_eq!(
            tokenize("urn:li:testEntity:(test1,urn1,VALUE_1)"),
            vec!["urn", "li", "testentity", "test1", "urn1", "value_1"]
        );
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("a")), Ordering::Less);
        assert_eq!(compare_scalars("10", "9"), Ordering::Greater);
        assert_eq!(compare_scalars("b", "a"), Ordering::Greater);
    }
}
