//! Entity specs and the read-only entity registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::{Display, EnumString};

use crate::error::{Result, SearchError};

/// How a searchable field is analyzed in the index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Keyword,
    Text,
    TextPartial,
    UrnPartial,
    BrowsePath,
    Boolean,
    Count,
    Datetime,
    Object,
}

impl FieldType {
    /// Whether free text is matched against this field
    pub fn is_text_searchable(&self) -> bool {
        matches!(
            self,
            FieldType::Keyword
                | FieldType::Text
                | FieldType::TextPartial
                | FieldType::UrnPartial
                | FieldType::Object
        )
    }
}

fn default_boost() -> f32 {
    1.0
}

/// A field of an entity document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchableField {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default = "default_boost")]
    pub boost: f32,

    /// Expose a terms facet for this field
    #[serde(default)]
    pub add_to_filters: bool,

    /// Relationship field pointing up/downstream; never highlighted
    #[serde(default)]
    pub lineage: bool,

    /// User-edited mirror queried together with this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_field: Option<String>,
}

impl SearchableField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            boost: 1.0,
            add_to_filters: false,
            lineage: false,
            edited_field: None,
        }
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.add_to_filters = true;
        self
    }

    pub fn lineage(mut self) -> Self {
        self.lineage = true;
        self
    }

    pub fn edited_as(mut self, edited: impl Into<String>) -> Self {
        self.edited_field = Some(edited.into());
        self
    }
}

/// Search-relevant description of one entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySpec {
    pub name: String,

    #[serde(default)]
    pub fields: Vec<SearchableField>,

    /// Field used by structured (non-fulltext) queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_field: Option<String>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, fields: Vec<SearchableField>) -> Self {
        Self {
            name: name.into(),
            fields,
            default_field: None,
        }
    }

    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = Some(field.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&SearchableField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn text_fields(&self) -> impl Iterator<Item = &SearchableField> {
        self.fields
            .iter()
            .filter(|field| field.field_type.is_text_searchable())
    }

    /// Designated structured-query field: explicit default, else the highest boosted text field
    pub fn structured_default_field(&self) -> String {
        if let Some(field) = &self.default_field {
            return field.clone();
        }
        self.text_fields()
            .max_by(|a, b| a.boost.total_cmp(&b.boost))
            .map(|field| field.name.clone())
            .unwrap_or_else(|| "urn".to_string())
    }

    /// Union of several specs, keeping the highest boost per field
    pub fn merged(name: impl Into<String>, specs: &[Arc<EntitySpec>]) -> EntitySpec {
        let mut fields: BTreeMap<String, SearchableField> = BTreeMap::new();
        for spec in specs {
            for field in &spec.fields {
                fields
                    .entry(field.name.clone())
                    .and_modify(|existing| {
                        if field.boost > existing.boost {
                            existing.boost = field.boost;
                        }
                        existing.add_to_filters |= field.add_to_filters;
                    })
                    .or_insert_with(|| field.clone());
            }
        }
        EntitySpec::new(name, fields.into_values().collect())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: Vec<EntitySpec>,
}

/// Read-only registry of entity specs, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    specs: BTreeMap<String, Arc<EntitySpec>>,
}

impl EntityRegistry {
    pub fn new(specs: Vec<EntitySpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.to_lowercase(), Arc::new(spec)))
                .collect(),
        }
    }

    /// Load from a YAML document with a top-level `entities` list
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        if file.entities.is_empty() {
            return Err(SearchError::Configuration(
                "entity registry defines no entities".to_string(),
            ));
        }
        Ok(Self::new(file.entities))
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<Arc<EntitySpec>> {
        self.specs.get(&name.to_lowercase()).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<EntitySpec>> {
        self.get(name)
            .ok_or_else(|| SearchError::invalid(format!("unknown entity type '{}'", name)))
    }

    /// Canonical entity names, sorted
    pub fn entity_names(&self) -> Vec<String> {
        self.specs.values().map(|spec| spec.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY_YAML: &str = r#"
entities:
  - name: dataset
    default_field: name
    fields:
      - { name: urn, type: URN_PARTIAL, boost: 10.0 }
      - { name: name, type: TEXT_PARTIAL, boost: 8.0 }
      - { name: platform, type: URN_PARTIAL, add_to_filters: true }
      - { name: fieldTags, type: URN_PARTIAL, edited_field: editedFieldTags }
      - { name: upstreams, type: URN_PARTIAL, lineage: true }
"#;

    #[test]
    fn test_registry_from_yaml() {
        let registry = EntityRegistry::from_yaml_str(REGISTRY_YAML).unwrap();
        let spec = registry.get("DataSet").unwrap();
        assert_eq!(spec.name, "dataset");
        assert_eq!(spec.fields.len(), 5);
        assert!(spec.field("platform").unwrap().add_to_filters);
        assert!(spec.field("upstreams").unwrap().lineage);
        assert_eq!(
            spec.field("fieldTags").unwrap().edited_field.as_deref(),
            Some("editedFieldTags")
        );
        assert_eq!(spec.structured_default_field(), "name");
    }

    #[test]
    fn test_unknown_entity() {
        let registry = EntityRegistry::from_yaml_str(REGISTRY_YAML).unwrap();
        assert!(registry.get("chart").is_none());
        assert!(matches!(
            registry.require("chart"),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(EntityRegistry::from_yaml_str("entities: []").is_err());
    }

    #[test]
    fn test_merged_spec_keeps_highest_boost() {
        let a = Arc::new(EntitySpec::new(
            "a",
            vec![SearchableField::new("name", FieldType::Text).boost(2.0)],
        ));
        let b = Arc::new(EntitySpec::new(
            "b",
            vec![
                SearchableField::new("name", FieldType::Text).boost(5.0),
                SearchableField::new("owner", FieldType::Keyword),
            ],
        ));
        let merged = EntitySpec::merged("all", &[a, b]);
        assert_eq!(merged.fields.len(), 2);
        assert_eq!(merged.field("name").unwrap().boost, 5.0);
    }
}
