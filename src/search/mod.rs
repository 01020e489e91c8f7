//! Search-range estimation and refinement.
//!
//! `global` establishes the run-wide initial range; `refine` narrows it per
//! tile using the seed disparity.

pub mod global;
pub mod refine;

pub use global::{range_from_match_points, read_search_range, resolve_global_range};
pub use refine::{RefinedRange, TileRangeRefiner};
