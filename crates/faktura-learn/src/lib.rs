//! Supplier-scoped pattern learning: a transactional store for human
//! corrections, and the extraction/matching/consolidation/cleanup logic that
//! turns corrections into confidence boosts for future extractions.

pub mod patterns;
pub mod store;

pub use patterns::{
    apply_boost, consolidate, cleanup, layout_hash, match_pattern, normalize_supplier,
    pattern_from_correction, record_use, similarity, PatternMatch, CONSOLIDATION_DISTANCE_PT,
    DEFAULT_BOOST_WEIGHT, DEFAULT_MAX_UNUSED_DAYS, MATCH_ACCEPT_THRESHOLD, MIN_USAGE_COUNT,
};
pub use store::{CorrectionRow, NewPattern, PatternRow, PatternStore, UNKNOWN_SUPPLIER};
