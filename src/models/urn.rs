use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

const URN_PREFIX: &str = "urn:li:";

/// Opaque unique identifier of a catalog entity, e.g. `urn:li:dataset:(urn:li:dataPlatform:hive,db.t,PROD)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Entity type segment of the urn (`dataset` for `urn:li:dataset:(...)`)
    pub fn entity_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(URN_PREFIX)?;
        let end = rest.find(':').unwrap_or(rest.len());
        let entity_type = &rest[..end];
        if entity_type.is_empty() {
            None
        } else {
            Some(entity_type)
        }
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Urn {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with(URN_PREFIX) {
            return Err(SearchError::invalid(format!("'{}' is not a urn", s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for Urn {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Urn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type() {
        let urn = Urn::new("urn:li:dataset:(urn:li:dataPlatform:hive,test,PROD)");
        assert_eq!(urn.entity_type(), Some("dataset"));

        let urn = Urn::new("urn:li:testEntity:(test1,urn1,VALUE_1)");
        assert_eq!(urn.entity_type(), Some("testEntity"));

        assert_eq!(Urn::new("not-a-urn").entity_type(), None);
        assert_eq!(Urn::new("urn:li:").entity_type(), None);
    }

    #[test]
    fn test_parse() {
        assert!("urn:li:corpuser:datahub".parse::<Urn>().is_ok());
        assert!("datahub".parse::<Urn>().is_err());
    }
}
