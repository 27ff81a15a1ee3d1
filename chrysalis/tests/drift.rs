//! Drift detection and the promotion decision: diff classification, the
//! rule order, thresholds, and determinism.

use maplit::btreemap;
use serde_json::json;

use chrysalis::diff::compute_diff;
use chrysalis::policy::{PromotionPolicy, decide};
use chrysalis::stats::FieldStat;
use chrysalis::{Config, PropertyDef, TypeTag, infer_from_sample};

mod shared;
use shared::schema_of;

fn stat(present: usize, present_pct: f64, tag: TypeTag) -> FieldStat {
    FieldStat {
        present,
        present_pct,
        type_counts: btreemap! { tag => present },
    }
}

#[test]
fn everything_is_added_against_no_schema() {
    let (candidate, stats) = infer_from_sample(&[json!({ "id": 1, "name": "a" })]);
    let diff = compute_diff(None, &candidate, &stats, None);

    assert_eq!(diff.added.len(), 2);
    assert!(diff.removed.is_empty());
    assert!(diff.changed.is_empty());
    assert_eq!(diff.added["id"].present, 1);
    assert!((diff.added["id"].present_pct - 1.0).abs() < f64::EPSILON);
}

#[test]
fn an_empty_old_schema_counts_as_no_schema() {
    let (candidate, stats) = infer_from_sample(&[json!({ "id": 1 })]);
    let diff = compute_diff(Some(&schema_of(&[])), &candidate, &stats, None);
    assert_eq!(diff.added.len(), 1);
}

#[test]
fn added_removed_and_changed_are_classified() {
    let old = schema_of(&[
        ("id", PropertyDef::single(TypeTag::Integer)),
        ("name", PropertyDef::single(TypeTag::String)),
    ]);
    let sample: Vec<_> = (0..10)
        .map(|n| json!({ "id": format!("{n}"), "email": "x@y" }))
        .collect();
    let (candidate, stats) = infer_from_sample(&sample);

    let old_stats = btreemap! {
        "id".to_owned() => stat(10, 1.0, TypeTag::Integer),
        "name".to_owned() => stat(9, 0.9, TypeTag::String),
    };
    let diff = compute_diff(Some(&old), &candidate, &stats, Some(&old_stats));

    assert_eq!(diff.added["email"].present, 10);
    assert_eq!(diff.removed["name"].prev_presence_pct, Some(0.9));
    let changed = &diff.changed["id"];
    assert_eq!(changed.old, PropertyDef::single(TypeTag::Integer));
    assert_eq!(changed.new, PropertyDef::single(TypeTag::String));
    assert_eq!(changed.new_dom_pct, Some(1.0));
}

#[test]
fn dominant_share_reflects_a_mixed_field() {
    let old = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    let mut sample: Vec<_> = (0..6).map(|n| json!({ "id": format!("{n}") })).collect();
    sample.extend((0..4).map(|n| json!({ "id": n })));
    let (candidate, stats) = infer_from_sample(&sample);

    let diff = compute_diff(Some(&old), &candidate, &stats, None);
    assert_eq!(diff.changed["id"].new_dom_pct, Some(0.6));
}

#[test]
fn removed_field_without_history_has_no_prev_presence() {
    let old = schema_of(&[
        ("id", PropertyDef::single(TypeTag::Integer)),
        ("gone", PropertyDef::single(TypeTag::String)),
    ]);
    let (candidate, stats) = infer_from_sample(&[json!({ "id": 1 })]);
    let diff = compute_diff(Some(&old), &candidate, &stats, None);
    assert_eq!(diff.removed["gone"].prev_presence_pct, None);
}

//
// Drift policy
//

#[test]
fn first_sample_promotes_unconditionally() {
    let (candidate, stats) = infer_from_sample(&[json!({ "id": 1 })]);
    let diff = compute_diff(None, &candidate, &stats, None);
    let config = Config::default();

    for policy in [PromotionPolicy::Drift, PromotionPolicy::Coverage] {
        let decision = decide(policy, &diff, &candidate, None, &stats, 1, &config);
        assert!(decision.promote);
        assert_eq!(decision.reasons, vec!["no_latest_schema"]);
    }
}

#[test]
fn removed_common_field_fires_first() {
    let config = Config::default();
    let old = schema_of(&[
        ("id", PropertyDef::single(TypeTag::Integer)),
        ("name", PropertyDef::single(TypeTag::String)),
    ]);
    // The batch both drops a common field and adds a new one; the removal
    // rule runs first and wins.
    let sample: Vec<_> = (0..10).map(|n| json!({ "id": n, "email": "x@y" })).collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let old_stats = btreemap! {
        "id".to_owned() => stat(10, 1.0, TypeTag::Integer),
        "name".to_owned() => stat(10, 1.0, TypeTag::String),
    };
    let diff = compute_diff(Some(&old), &candidate, &stats, Some(&old_stats));

    let decision = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert!(decision.promote);
    assert_eq!(decision.reasons, vec!["removed_common_field:name"]);
}

#[test]
fn removal_below_the_historical_bar_does_not_fire() {
    let config = Config::default();
    let old = schema_of(&[
        ("id", PropertyDef::single(TypeTag::Integer)),
        ("rare", PropertyDef::single(TypeTag::String)),
    ]);
    let sample: Vec<_> = (0..10).map(|n| json!({ "id": n })).collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let old_stats = btreemap! {
        "id".to_owned() => stat(10, 1.0, TypeTag::Integer),
        "rare".to_owned() => stat(1, 0.1, TypeTag::String),
    };
    let diff = compute_diff(Some(&old), &candidate, &stats, Some(&old_stats));

    let decision = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert!(!decision.promote);
    assert_eq!(decision.reasons, vec!["no_major_drift"]);
}

#[test]
fn added_field_fires_at_the_percentage_threshold() {
    let config = Config::default();
    let old = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    // 2 of 20 documents carry the new field: exactly 10%.
    let sample: Vec<_> = (0..20)
        .map(|n| {
            if n < 2 {
                json!({ "id": n, "tag": "new" })
            } else {
                json!({ "id": n })
            }
        })
        .collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&old), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert!(decision.promote);
    assert_eq!(decision.reasons, vec!["added_common_field:tag"]);
}

#[test]
fn added_field_count_floor_backs_up_the_percentage() {
    let config = Config::default();
    let old = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    // 2 of 25 documents: 8% misses the percentage test, but the count
    // floor is floor(0.10 × 25) = 2, so the count test fires.
    let sample: Vec<_> = (0..25)
        .map(|n| {
            if n < 2 {
                json!({ "id": n, "tag": "new" })
            } else {
                json!({ "id": n })
            }
        })
        .collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&old), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert!(decision.promote);
    assert_eq!(decision.reasons, vec!["added_common_field:tag"]);
}

#[test]
fn type_shift_fires_on_a_dominant_new_type() {
    let config = Config::default();
    let old = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    let sample: Vec<_> = (0..10).map(|n| json!({ "id": format!("{n}") })).collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&old), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert!(decision.promote);
    assert_eq!(decision.reasons, vec!["type_shift:id"]);
}

#[test]
fn decisions_are_deterministic() {
    let config = Config::default();
    let old = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    let sample: Vec<_> = (0..10).map(|n| json!({ "id": n, "extra": true })).collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&old), &candidate, &stats, None);

    let first = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    let second = decide(
        PromotionPolicy::Drift,
        &diff,
        &candidate,
        Some(&old),
        &stats,
        sample.len(),
        &config,
    );
    assert_eq!(first, second);
}

//
// Coverage policy
//

#[test]
fn coverage_declines_equal_schemas_with_a_reason() {
    let config = Config::default();
    let sample = vec![json!({ "id": 1 })];
    let (candidate, stats) = infer_from_sample(&sample);
    let latest = candidate.clone();
    let diff = compute_diff(Some(&latest), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Coverage,
        &diff,
        &candidate,
        Some(&latest),
        &stats,
        sample.len(),
        &config,
    );
    assert!(!decision.promote);
    assert_eq!(decision.reasons, vec!["schemas_equal"]);
}

#[test]
fn coverage_promotes_a_well_supported_candidate() {
    let config = Config::default();
    let latest = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    let sample: Vec<_> = (0..10).map(|n| json!({ "id": n, "name": "x" })).collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&latest), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Coverage,
        &diff,
        &candidate,
        Some(&latest),
        &stats,
        sample.len(),
        &config,
    );
    assert!(decision.promote);
    assert_eq!(decision.reasons, vec!["coverage_ok(1.00)"]);
}

#[test]
fn coverage_declines_a_sparse_candidate_with_a_reason() {
    let config = Config::default();
    let latest = schema_of(&[("id", PropertyDef::single(TypeTag::Integer))]);
    // Half the documents carry the second field, so only 50% of candidate
    // properties clear the 90% support bar.
    let sample: Vec<_> = (0..10)
        .map(|n| {
            if n % 2 == 0 {
                json!({ "id": n, "name": "x" })
            } else {
                json!({ "id": n })
            }
        })
        .collect();
    let (candidate, stats) = infer_from_sample(&sample);
    let diff = compute_diff(Some(&latest), &candidate, &stats, None);

    let decision = decide(
        PromotionPolicy::Coverage,
        &diff,
        &candidate,
        Some(&latest),
        &stats,
        sample.len(),
        &config,
    );
    assert!(!decision.promote);
    assert_eq!(decision.reasons, vec!["coverage_fail(0.50)"]);
}
