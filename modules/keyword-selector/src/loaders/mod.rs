//! The four signal loaders. Each reads through `SignalReader` and emits raw
//! candidates for exactly one slice, in load order.

pub mod demand;
pub mod explore;
pub mod refresh;
pub mod unmet;

pub use demand::{demand_candidates, load_demand_rows};
pub use explore::{explore_candidates, load_explore_candidates, ExploreInputs};
pub use refresh::{load_refresh_candidates, refresh_candidates};
pub use unmet::{load_unmet_requests, unmet_candidates};
