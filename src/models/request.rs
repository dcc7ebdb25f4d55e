//! Search and lineage-search requests

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

use crate::error::{Result, SearchError};
use crate::models::filter::Filter;
use crate::models::urn::Urn;

/// Sort order for search results
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Sort by a document field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SortCriterion {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortCriterion {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Per-request switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct SearchFlags {
    /// Compile `input` as full text across all searchable fields
    pub fulltext: bool,

    /// Bypass cache reads (results are still stored)
    pub skip_cache: bool,

    /// Open a point-in-time for scroll requests
    pub point_in_time_creation: bool,

    pub skip_highlighting: bool,

    pub skip_aggregates: bool,

    /// Caller deadline for every upstream call made on behalf of this request
    pub timeout_ms: Option<u64>,
}

impl Default for SearchFlags {
    fn default() -> Self {
        Self {
            fulltext: true,
            skip_cache: false,
            point_in_time_creation: false,
            skip_highlighting: false,
            skip_aggregates: false,
            timeout_ms: None,
        }
    }
}

impl SearchFlags {
    pub fn with_fulltext(mut self, fulltext: bool) -> Self {
        self.fulltext = fulltext;
        self
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn with_skip_aggregates(mut self, skip_aggregates: bool) -> Self {
        self.skip_aggregates = skip_aggregates;
        self
    }

    pub fn with_skip_highlighting(mut self, skip_highlighting: bool) -> Self {
        self.skip_highlighting = skip_highlighting;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Pagination mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    /// Classic offset pagination
    Offset { from: usize, size: usize },

    /// Cursor pagination; `scroll_id` is absent on the first page
    Scroll {
        scroll_id: Option<String>,
        keep_alive: String,
        size: usize,
    },
}

impl Page {
    pub fn size(&self) -> usize {
        match self {
            Page::Offset { size, .. } | Page::Scroll { size, .. } => *size,
        }
    }

    pub fn from(&self) -> usize {
        match self {
            Page::Offset { from, .. } => *from,
            Page::Scroll { .. } => 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::Offset { from: 0, size: 10 }
    }
}

/// A search over one entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchRequest {
    #[serde(default)]
    pub input: Option<String>,

    #[serde(default)]
    pub filter: Filter,

    #[serde(default)]
    pub sort: Vec<SortCriterion>,

    #[serde(default)]
    pub page: Page,

    #[serde(default)]
    pub flags: SearchFlags,

    /// Restrict hits to these urns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn_restriction: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortCriterion>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, from: usize, size: usize) -> Self {
        self.page = Page::Offset { from, size };
        self
    }

    pub fn with_scroll(
        mut self,
        scroll_id: Option<String>,
        keep_alive: impl Into<String>,
        size: usize,
    ) -> Self {
        self.page = Page::Scroll {
            scroll_id,
            keep_alive: keep_alive.into(),
            size,
        };
        self
    }

    pub fn with_flags(mut self, flags: SearchFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_urn_restriction(mut self, urns: Vec<String>) -> Self {
        self.urn_restriction = Some(urns);
        self
    }

    /// Reject malformed requests before any upstream call
    pub fn validate(&self, max_page_size: usize) -> Result<()> {
        self.filter.validate()?;
        let size = self.page.size();
        if size > max_page_size {
            return Err(SearchError::invalid(format!(
                "page size {} exceeds maximum {}",
                size, max_page_size
            )));
        }
        if self.page.from().saturating_add(size) > max_page_size.saturating_mul(10) {
            return Err(SearchError::invalid(format!(
                "offset {} is beyond the paging window",
                self.page.from()
            )));
        }
        Ok(())
    }
}

/// Direction of lineage traversal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageDirection {
    Upstream,
    Downstream,
}

/// "Search within N hops of `root_urn`"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageSearchRequest {
    pub root_urn: Urn,

    pub direction: LineageDirection,

    /// Empty means every entity type
    #[serde(default)]
    pub entity_types: Vec<String>,

    #[serde(default)]
    pub input: Option<String>,

    #[serde(default)]
    pub max_hops: Option<u32>,

    #[serde(default)]
    pub filter: Filter,

    #[serde(default)]
    pub sort: Vec<SortCriterion>,

    #[serde(default)]
    pub from: usize,

    #[serde(default = "default_lineage_page_size")]
    pub size: usize,

    #[serde(default)]
    pub start_time_millis: Option<i64>,

    #[serde(default)]
    pub end_time_millis: Option<i64>,

    #[serde(default)]
    pub flags: SearchFlags,
}

fn default_lineage_page_size() -> usize {
    10
}

impl LineageSearchRequest {
    pub fn new(root_urn: Urn, direction: LineageDirection) -> Self {
        Self {
            root_urn,
            direction,
            entity_types: Vec::new(),
            input: None,
            max_hops: None,
            filter: Filter::default(),
            sort: Vec::new(),
            from: 0,
            size: default_lineage_page_size(),
            start_time_millis: None,
            end_time_millis: None,
            flags: SearchFlags::default(),
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_entity_types(mut self, entity_types: Vec<impl Into<String>>) -> Self {
        self.entity_types = entity_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = Some(max_hops);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortCriterion>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }

    pub fn with_time_window(mut self, start_millis: i64, end_millis: i64) -> Self {
        self.start_time_millis = Some(start_millis);
        self.end_time_millis = Some(end_millis);
        self
    }

    pub fn with_flags(mut self, flags: SearchFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn validate(&self, max_page_size: usize) -> Result<()> {
        self.filter.validate()?;
        if self.size > max_page_size {
            return Err(SearchError::invalid(format!(
                "page size {} exceeds maximum {}",
                self.size, max_page_size
            )));
        }
        if let (Some(start), Some(end)) = (self.start_time_millis, self.end_time_millis) {
            if start > end {
                return Err(SearchError::invalid(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }
        if self.max_hops == Some(0) {
            return Err(SearchError::invalid("max hops must be at least 1"));
        }
        Ok(())
    }
}

/// Whether free text is the match-all wildcard (`*`, empty or absent)
pub fn is_wildcard_input(input: Option<&str>) -> bool {
    match input.map(str::trim) {
        None => true,
        Some(text) => text.is_empty() || text == "*",
    }
}
