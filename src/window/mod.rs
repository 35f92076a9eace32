//! Feature window module
//!
//! Rolling per-event sample buffer and the feature vector derived from it

mod buffer;
mod features;

pub use buffer::FeatureWindow;
pub use features::{FeatureEngine, FeatureResult, FeatureVector, Unavailable, PRICE_LOOKBACKS};
