pub mod allocation;
pub mod area;
pub mod candidate;
pub mod dedup;
pub mod filter;
pub mod history;
pub mod loaders;
pub mod scoring;
pub mod selector;
pub mod stats;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use candidate::{ExploreComponents, ExploreSignals, Origin, TermCandidate};
pub use selector::{KeywordSelector, SelectionResult};
pub use stats::{DropCounts, SelectionStats, SliceStats};
pub use traits::{HistoryScope, SignalReader};
