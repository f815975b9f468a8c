pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::{ExploreFloors, SelectorConfig, MAX_WINDOW_DAYS};
pub use error::KeywordError;
pub use normalize::normalize_keyword_term;
pub use types::*;
