//! Weight propagation
//!
//! Spreads interest from a seed user across the interaction graph and
//! ranks the posts it reaches.

mod engine;

pub use engine::PropagationEngine;

use serde::{Deserialize, Serialize};

/// A candidate post and the weight that ranked it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub post_id: String,
    pub score: f64,
}
