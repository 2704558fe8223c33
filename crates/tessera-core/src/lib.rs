//! Tessera Core: selection state, search overlay, weight cache and aggregation

pub mod model;
pub mod error;
pub mod tree;
pub mod config;
pub mod sweep;
pub mod selection;
pub mod search;
pub mod weigh;
pub mod cache;
pub mod aggregation;


#[cfg(test)]
pub mod test_utils;

pub use model::{Root, NodeKind, ChildEntry, CheckState, sort_entries};
pub use error::{Error, Result};
pub use tree::TreeSource;
pub use config::{EngineConfig, CACHE_DIR, WEIGHT_CACHE, DEFAULT_RULE_FILE, DEFAULT_OVERRIDE_FILE};
pub use sweep::{CancellationToken, SweepControl, SweepOutcome};
pub use selection::SelectionStore;
pub use search::{InclusionOverlay, QueryMatcher};
pub use weigh::{Weigher, TokenEstimator};
pub use cache::{WeightCache, CacheOptions, CacheEntry, CacheStats, TOOL_VERSION, CACHE_FORMAT_VERSION};
pub use aggregation::{WeightSummary, summarize};
