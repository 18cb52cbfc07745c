//! Decision logic: which action to take and which profile to target.
//!
//! - [`dispatch`]: behavior pattern band tables
//! - [`selector`]: popularity-biased candidate sampling

pub mod dispatch;
pub mod selector;

pub use dispatch::{band_table, choose_action, Action, Band};
pub use selector::{BiasPolicy, CandidatePools, SelectorConfig, WeightedSelector};
