//! Physical index naming
//!
//! Logical entity and aspect names map to lower-cased physical index names,
//! optionally prefixed by a tenant, with a versioned suffix:
//!
//! ```text
//! entity:     [<prefix>_]<entity>_index_v2
//! timeseries: [<prefix>_]<entity>_<aspect>_aspect_v1
//! ```

use dashmap::DashMap;

const ENTITY_INDEX_SUFFIX: &str = "index";
const ENTITY_INDEX_VERSION: &str = "v2";
const TIMESERIES_INDEX_SUFFIX: &str = "aspect";
const TIMESERIES_INDEX_VERSION: &str = "v1";

/// Index naming convention for one tenant
#[derive(Debug, Default)]
pub struct IndexConvention {
    prefix: Option<String>,
    /// logical name -> physical name
    names: DashMap<String, String>,
    /// physical entity index -> entity name as first requested
    entities: DashMap<String, String>,
}

impl IndexConvention {
    /// An empty prefix is the same as no prefix
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string),
            names: DashMap::new(),
            entities: DashMap::new(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn prefix_string(&self) -> String {
        self.prefix
            .as_ref()
            .map(|prefix| format!("{}_", prefix))
            .unwrap_or_default()
    }

    /// Physical name for a logical name, memoized
    pub fn index_name(&self, logical_name: &str) -> String {
        if let Some(name) = self.names.get(logical_name) {
            return name.clone();
        }
        self.names
            .entry(logical_name.to_string())
            .or_insert_with(|| format!("{}{}", self.prefix_string(), logical_name).to_lowercase())
            .clone()
    }

    pub fn entity_index_name(&self, entity_name: &str) -> String {
        let name = self.index_name(&format!(
            "{}_{}_{}",
            entity_name, ENTITY_INDEX_SUFFIX, ENTITY_INDEX_VERSION
        ));
        if !self.entities.contains_key(&name) {
            self.entities
                .entry(name.clone())
                .or_insert_with(|| entity_name.to_string());
        }
        name
    }

    pub fn timeseries_aspect_index_name(&self, entity_name: &str, aspect_name: &str) -> String {
        format!(
            "{}_{}_{}",
            self.index_name(&format!("{}_{}", entity_name, aspect_name)),
            TIMESERIES_INDEX_SUFFIX,
            TIMESERIES_INDEX_VERSION
        )
    }

    /// Glob matching every entity index of this tenant
    pub fn all_entity_indices_pattern(&self) -> String {
        format!(
            "{}*{}_{}",
            self.prefix_string(),
            ENTITY_INDEX_SUFFIX,
            ENTITY_INDEX_VERSION
        )
    }

    /// Glob matching every timeseries aspect index of this tenant
    pub fn all_timeseries_indices_pattern(&self) -> String {
        format!(
            "{}*{}_{}",
            self.prefix_string(),
            TIMESERIES_INDEX_SUFFIX,
            TIMESERIES_INDEX_VERSION
        )
    }

    /// Entity name of a physical entity index.
    ///
    /// Names produced by [`Self::entity_index_name`] come back exactly as they
    /// were passed in; other names are parsed and come back lower-cased.
    pub fn entity_name_from_index(&self, index_name: &str) -> Option<String> {
        if let Some(entity) = self.entities.get(index_name) {
            return Some(entity.clone());
        }

        let prefix = self.prefix_string();
        if !index_name.starts_with(&prefix) {
            return None;
        }
        let marker = format!("_{}_{}", ENTITY_INDEX_SUFFIX, ENTITY_INDEX_VERSION);
        let suffix_start = index_name.find(&marker)?;
        if prefix.len() < suffix_start {
            Some(index_name[prefix.len()..suffix_start].to_string())
        } else {
            None
        }
    }

    /// Number of memoized logical names
    pub fn cached_names(&self) -> usize {
        self.names.len()
    }
}
