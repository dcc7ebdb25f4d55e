//! Result caches
//!
//! ```text
//! request ──► key ──► TtlCache ──hit──► decode ──► value
//!                        │
//!                       miss (single-flight per key)
//!                        ▼
//!                    compute ──ok──► encode + store
//!                        │
//!                       err ──► returned, never stored
//! ```

mod doc_count;
mod keys;
mod ttl;

pub use doc_count::DocCountCache;
pub use keys::{EntitySearchKey, GraphCacheKey, LineageCacheKey};
pub use ttl::TtlCache;
