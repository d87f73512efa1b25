//! Pattern extraction, supplier-scoped matching, consolidation and cleanup
//! (spec §4.9). All of these operate on the [`PatternStore`] rows rather than
//! on live pages — the caller (`faktura-pipeline`) is responsible for turning
//! a correction into a `layout_hash` and for applying a matched boost to a
//! candidate score before calibration.

use chrono::{DateTime, Duration, Utc};
use faktura_core::{BBox, Correction, Result};

use crate::store::{NewPattern, PatternRow, PatternStore, UNKNOWN_SUPPLIER};

/// Default confidence boost assigned to a freshly learned pattern (spec
/// §4.9: "new patterns start at a modest default boost").
pub const DEFAULT_BOOST_WEIGHT: f32 = 0.10;

/// Minimum similarity for a candidate bbox to be considered a match against
/// an existing pattern (spec §4.9: "accept matches scoring at least 0.5").
pub const MATCH_ACCEPT_THRESHOLD: f64 = 0.5;

/// Centroid distance (in points) below which two patterns are folded
/// together during consolidation (spec §4.9: "patterns whose anchors fall
/// within 50pt of one another are merged").
pub const CONSOLIDATION_DISTANCE_PT: f64 = 50.0;

/// Default pattern age, in days, after which an unused pattern is eligible
/// for cleanup (spec §4.9: "unused for 90 days by default").
pub const DEFAULT_MAX_UNUSED_DAYS: i64 = 90;

/// Minimum sample count a pattern must retain to survive a cleanup sweep.
pub const MIN_USAGE_COUNT: u32 = 1;

/// Normalizes a supplier name for stable lookups: lowercased and trimmed.
/// Empty input maps to the [`UNKNOWN_SUPPLIER`] sentinel (an adopted Open
/// Question: unattributed corrections are pooled rather than discarded).
#[must_use]
pub fn normalize_supplier(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        UNKNOWN_SUPPLIER.to_string()
    } else {
        trimmed
    }
}

/// Derives a stable layout hash from a supplier name and a coarse signature
/// of the footer's keyword layout. Two documents from the same supplier with
/// the same footer keyword ordering hash identically, which is the
/// granularity patterns are matched at.
#[must_use]
pub fn layout_hash(supplier_normalized: &str, footer_signature: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    supplier_normalized.hash(&mut hasher);
    footer_signature.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Turns a recorded correction into a new (unlearned) pattern, ready to be
/// upserted into the store with the default boost weight.
#[must_use]
pub fn pattern_from_correction(correction: &Correction, recorded_at: DateTime<Utc>) -> NewPattern {
    NewPattern {
        supplier_name: normalize_supplier(&correction.supplier_name),
        layout_hash: correction.layout_hash.clone(),
        field_name: correction.field_name.clone(),
        anchor_bbox: correction.bbox,
        boost_weight: DEFAULT_BOOST_WEIGHT,
        recorded_at,
    }
}

/// Euclidean centroid distance between two bboxes' centers.
fn centroid_distance(a: &BBox, b: &BBox) -> f64 {
    a.centroid_distance(b)
}

/// Similarity of a candidate bbox against a learned pattern: half weight on
/// an exact layout-hash match, half weight on inverse centroid distance
/// (spec §4.9: "similarity = 0.5 × layout-hash match + 0.5 × 1/(1 +
/// distance/100)").
#[must_use]
pub fn similarity(pattern: &PatternRow, candidate_bbox: &BBox, candidate_layout_hash: &str) -> f64 {
    let hash_component = if pattern.layout_hash == candidate_layout_hash { 1.0 } else { 0.0 };
    let distance = centroid_distance(&pattern.anchor_bbox, candidate_bbox);
    let distance_component = 1.0 / (1.0 + distance / 100.0);
    0.5 * hash_component + 0.5 * distance_component
}

/// The outcome of attempting to match a candidate against a supplier's
/// learned patterns.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern_id: i64,
    pub boost_weight: f32,
    pub similarity: f64,
}

/// Finds the best-matching pattern for `candidate_bbox`/`candidate_layout_hash`
/// among the supplier's stored patterns for `field_name`, accepting only
/// matches at or above [`MATCH_ACCEPT_THRESHOLD`].
///
/// # Errors
/// Returns [`faktura_core::FakturaError::PatternStore`] on a database failure.
pub fn match_pattern(
    store: &PatternStore,
    supplier_name: &str,
    field_name: &str,
    candidate_bbox: &BBox,
    candidate_layout_hash: &str,
) -> Result<Option<PatternMatch>> {
    let supplier_normalized = normalize_supplier(supplier_name);
    let candidates = store.patterns_for_supplier(&supplier_normalized, field_name)?;

    let best = candidates
        .iter()
        .map(|p| (p, similarity(p, candidate_bbox, candidate_layout_hash)))
        .filter(|(_, score)| *score >= MATCH_ACCEPT_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap());

    Ok(best.map(|(p, score)| PatternMatch { pattern_id: p.id, boost_weight: p.boost_weight, similarity: score }))
}

/// Applies a matched pattern's boost to a raw candidate score, clamped to
/// `[0, 1]` (spec §4.9: "boosts are applied to the raw score before
/// calibration, clamped to at most 1.0").
#[must_use]
pub fn apply_boost(raw_score: f32, boost_weight: f32) -> f32 {
    (raw_score + boost_weight).min(1.0)
}

/// Records that `pattern_id` was used just now: increments usage count and
/// bumps the last-used timestamp.
///
/// # Errors
/// Returns [`faktura_core::FakturaError::PatternStore`] on a database failure.
pub fn record_use(store: &PatternStore, pattern_id: i64, used_at: DateTime<Utc>) -> Result<()> {
    store.record_pattern_use(pattern_id, used_at)
}

/// Merges patterns whose anchors fall within [`CONSOLIDATION_DISTANCE_PT`] of
/// one another within the same supplier/field/layout-hash group, keeping a
/// single surviving row with combined usage and a weighted-average boost
/// (spec §4.9: consolidation).
///
/// Returns the number of patterns removed by merging.
///
/// # Errors
/// Returns [`faktura_core::FakturaError::PatternStore`] on a database failure.
pub fn consolidate(store: &PatternStore) -> Result<usize> {
    let all = store.all_patterns()?;
    let mut groups: std::collections::HashMap<(String, String, String), Vec<PatternRow>> = std::collections::HashMap::new();
    for p in all {
        groups.entry((p.supplier_name.clone(), p.field_name.clone(), p.layout_hash.clone())).or_default().push(p);
    }

    let mut removed = 0usize;
    for (_, mut rows) in groups {
        if rows.len() < 2 {
            continue;
        }
        // Greedily cluster by centroid distance; each cluster collapses to
        // its highest-usage member (conflict resolution: "keep the
        // highest-usage pattern, tie-break on the larger boost").
        rows.sort_by(|a, b| b.sample_count.cmp(&a.sample_count).then(b.boost_weight.partial_cmp(&a.boost_weight).unwrap()));

        let mut consumed = vec![false; rows.len()];
        for i in 0..rows.len() {
            if consumed[i] {
                continue;
            }
            let mut cluster_count = rows[i].sample_count;
            let mut weighted_boost = rows[i].boost_weight as f64 * rows[i].sample_count as f64;
            let mut latest_use = rows[i].last_used_at;

            for j in (i + 1)..rows.len() {
                if consumed[j] {
                    continue;
                }
                if centroid_distance(&rows[i].anchor_bbox, &rows[j].anchor_bbox) <= CONSOLIDATION_DISTANCE_PT {
                    cluster_count += rows[j].sample_count;
                    weighted_boost += rows[j].boost_weight as f64 * rows[j].sample_count as f64;
                    latest_use = latest_use.max(rows[j].last_used_at);
                    consumed[j] = true;
                    store.delete_pattern(rows[j].id)?;
                    removed += 1;
                }
            }

            if cluster_count != rows[i].sample_count {
                let merged_boost = (weighted_boost / cluster_count as f64) as f32;
                store.update_pattern(rows[i].id, cluster_count, merged_boost, latest_use)?;
            }
        }
    }

    Ok(removed)
}

/// Removes patterns unused for more than `max_unused_days`, or that never
/// accumulated at least [`MIN_USAGE_COUNT`] additional uses beyond creation
/// (spec §4.9: cleanup). Returns the number of patterns removed.
///
/// # Errors
/// Returns [`faktura_core::FakturaError::PatternStore`] on a database failure.
pub fn cleanup(store: &PatternStore, now: DateTime<Utc>, max_unused_days: i64) -> Result<usize> {
    let all = store.all_patterns()?;
    let cutoff = now - Duration::days(max_unused_days);

    let mut removed = 0usize;
    for p in all {
        let stale = p.last_used_at < cutoff;
        let unused = p.sample_count < MIN_USAGE_COUNT;
        if stale || unused {
            store.delete_pattern(p.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f64, y: f64) -> BBox {
        BBox::new(x, y, 10.0, 10.0)
    }

    #[test]
    fn normalize_supplier_lowercases_and_trims() {
        assert_eq!(normalize_supplier("  ACME AB  "), "acme ab");
    }

    #[test]
    fn normalize_supplier_empty_maps_to_unknown() {
        assert_eq!(normalize_supplier("   "), UNKNOWN_SUPPLIER);
    }

    #[test]
    fn layout_hash_is_deterministic() {
        let a = layout_hash("acme ab", "total,vat");
        let b = layout_hash("acme ab", "total,vat");
        assert_eq!(a, b);
    }

    #[test]
    fn layout_hash_differs_on_different_signature() {
        let a = layout_hash("acme ab", "total,vat");
        let b = layout_hash("acme ab", "subtotal,total,vat");
        assert_ne!(a, b);
    }

    #[test]
    fn apply_boost_clamps_to_one() {
        assert_eq!(apply_boost(0.95, 0.10), 1.0);
        assert!((apply_boost(0.50, 0.10) - 0.60).abs() < 1e-6);
    }

    #[test]
    fn similarity_is_one_for_exact_hash_and_zero_distance() {
        let pattern = PatternRow {
            id: 1,
            supplier_name: "acme ab".into(),
            layout_hash: "h1".into(),
            field_name: "total_amount".into(),
            anchor_bbox: bbox(10.0, 10.0),
            sample_count: 1,
            boost_weight: 0.1,
            last_used_at: Utc::now(),
        };
        let score = similarity(&pattern, &bbox(10.0, 10.0), "h1");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn match_pattern_respects_supplier_scoping() {
        let store = PatternStore::in_memory().unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(10.0, 10.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();

        let matched = match_pattern(&store, "acme ab", "total_amount", &bbox(10.0, 10.0), "h1").unwrap();
        assert!(matched.is_some());

        let unmatched = match_pattern(&store, "other ab", "total_amount", &bbox(10.0, 10.0), "h1").unwrap();
        assert!(unmatched.is_none());
    }

    #[test]
    fn match_pattern_rejects_below_threshold() {
        let store = PatternStore::in_memory().unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(10.0, 10.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();

        // Different hash and far away: hash component 0, distance component small.
        let matched = match_pattern(&store, "acme ab", "total_amount", &bbox(500.0, 500.0), "h2").unwrap();
        assert!(matched.is_none());
    }

    #[test]
    fn consolidate_merges_nearby_same_group_patterns() {
        let store = PatternStore::in_memory().unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(100.0, 100.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(110.0, 105.0),
                boost_weight: 0.2,
                recorded_at: Utc::now(),
            })
            .unwrap();

        let removed = consolidate(&store).unwrap();
        assert_eq!(removed, 1);
        let remaining = store.patterns_for_supplier("acme ab", "total_amount").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sample_count, 2);
    }

    #[test]
    fn consolidate_leaves_distant_patterns_separate() {
        let store = PatternStore::in_memory().unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(0.0, 0.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(1000.0, 1000.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();

        let removed = consolidate(&store).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn cleanup_removes_stale_patterns() {
        let store = PatternStore::in_memory().unwrap();
        let old_use = Utc::now() - Duration::days(200);
        store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(0.0, 0.0),
                boost_weight: 0.1,
                recorded_at: old_use,
            })
            .unwrap();

        let removed = cleanup(&store, Utc::now(), DEFAULT_MAX_UNUSED_DAYS).unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn cleanup_keeps_recently_used_patterns() {
        let store = PatternStore::in_memory().unwrap();
        let id = store
            .upsert_pattern(&NewPattern {
                supplier_name: "acme ab".into(),
                layout_hash: "h1".into(),
                field_name: "total_amount".into(),
                anchor_bbox: bbox(0.0, 0.0),
                boost_weight: 0.1,
                recorded_at: Utc::now(),
            })
            .unwrap();
        store.record_pattern_use(id, Utc::now()).unwrap();

        let removed = cleanup(&store, Utc::now(), DEFAULT_MAX_UNUSED_DAYS).unwrap();
        assert_eq!(removed, 0);
    }
}
