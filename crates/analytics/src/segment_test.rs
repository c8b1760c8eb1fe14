//! Tests for behavioral segmentation

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone, Utc};

use pulse_model::{Channel, EventKind, EventRecord, ExperimentAssignment, Group, User, UserId};
use pulse_store::MemoryStore;

use crate::error::AnalyticsError;
use crate::segment::features::{extract_features, ExtractedFeatures, UserProfile};
use crate::segment::{
    segment_table, segment_users, FeatureSchema, FeatureTable, SegmentConfig, SelectionRule,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

/// Build extraction output directly from synthetic feature rows
fn synthetic(rows: Vec<Vec<f64>>, schema: FeatureSchema) -> ExtractedFeatures {
    let user_ids: Vec<UserId> = (1..=rows.len() as u64).map(UserId).collect();
    let profiles: BTreeMap<UserId, UserProfile> = user_ids
        .iter()
        .map(|&id| {
            (
                id,
                UserProfile {
                    signup: date(1),
                    days_to_first_reward: None,
                    group: None,
                    converted: None,
                    d7_eligible: false,
                    d7_retained: false,
                },
            )
        })
        .collect();
    ExtractedFeatures {
        table: FeatureTable {
            schema,
            user_ids,
            rows,
        },
        profiles,
    }
}

/// Three tight, well-separated blobs of sizes 30, 30, and 40
fn three_blobs() -> Vec<Vec<f64>> {
    let mut rows = Vec::new();
    let centers = [(0.0, 0.0, 30), (10.0, 0.0, 30), (0.0, 10.0, 40)];
    for &(cx, cy, count) in &centers {
        for i in 0..count {
            let dx = (i % 6) as f64 * 0.05;
            let dy = (i / 6) as f64 * 0.05;
            rows.push(vec![cx + dx, cy + dy]);
        }
    }
    rows
}

#[test]
fn test_well_separated_blobs_choose_k3() {
    let schema = FeatureSchema::new(["x", "y"]);
    let extracted = synthetic(three_blobs(), schema.clone());
    let config = SegmentConfig::new(date(20))
        .with_schema(schema)
        .with_k_range(2..=6);

    let report = segment_table(&extracted, &config).unwrap();

    assert_eq!(report.selection.chosen_k, 3);
    assert_eq!(report.clusters.len(), 3);

    let mut sizes: Vec<u64> = report.clusters.iter().map(|c| c.size).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![30, 30, 40]);
}

#[test]
fn test_segment_sizes_partition_population() {
    let schema = FeatureSchema::new(["x", "y"]);
    let extracted = synthetic(three_blobs(), schema.clone());
    let config = SegmentConfig::new(date(20))
        .with_schema(schema)
        .with_k_range(2..=5);

    let report = segment_table(&extracted, &config).unwrap();

    assert_eq!(report.assignments.len(), 100);
    let size_sum: u64 = report.clusters.iter().map(|c| c.size).sum();
    assert_eq!(size_sum, report.total_users);
    // every label refers to an existing cluster
    for &label in report.assignments.values() {
        assert!(label < report.selection.chosen_k);
    }
}

#[test]
fn test_clustering_is_deterministic() {
    let schema = FeatureSchema::new(["x", "y"]);
    let extracted = synthetic(three_blobs(), schema.clone());
    let config = SegmentConfig::new(date(20))
        .with_schema(schema)
        .with_k_range(2..=6)
        .with_seed(7);

    let first = segment_table(&extracted, &config).unwrap();
    let second = segment_table(&extracted, &config).unwrap();

    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.selection, second.selection);
}

#[test]
fn test_selection_rule_is_reported() {
    let schema = FeatureSchema::new(["x", "y"]);
    let extracted = synthetic(three_blobs(), schema.clone());
    let config = SegmentConfig::new(date(20))
        .with_schema(schema)
        .with_k_range(2..=6);

    let report = segment_table(&extracted, &config).unwrap();
    // diagnostics cover the whole candidate range with finite scores
    assert_eq!(report.diagnostics.len(), 5);
    for diagnostic in &report.diagnostics {
        assert!(diagnostic.inertia.is_finite());
        assert!(diagnostic.silhouette.is_finite());
    }
    assert!(matches!(
        report.selection.rule,
        SelectionRule::Silhouette | SelectionRule::Elbow
    ));
}

#[test]
fn test_schema_validation_fails_fast() {
    let table = FeatureTable {
        schema: FeatureSchema::new(["x", "y"]),
        user_ids: vec![UserId(1)],
        rows: vec![vec![1.0, 2.0]],
    };

    let err = table
        .validate_schema(&FeatureSchema::new(["x", "y", "z"]))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidInput(_)));

    let err = table
        .validate_schema(&FeatureSchema::new(["x"]))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidInput(_)));
}

#[test]
fn test_too_few_users_is_insufficient_data() {
    let schema = FeatureSchema::new(["x", "y"]);
    let extracted = synthetic(vec![vec![0.0, 0.0], vec![1.0, 1.0]], schema.clone());
    let config = SegmentConfig::new(date(20)).with_schema(schema);

    let err = segment_table(&extracted, &config).unwrap_err();
    assert!(matches!(err, AnalyticsError::InsufficientData(_)));
}

#[tokio::test]
async fn test_extract_features_aggregates() {
    let signup = date(1);
    let users = vec![User::new(1, signup, Channel::Organic, "high_potential")];
    let ts = |d: u32, h: u32| Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap();
    let events = vec![
        EventRecord::new(1, 1, EventKind::AppOpen, ts(2, 10)),
        EventRecord::new(2, 1, EventKind::RewardEarned, ts(2, 11)).with_value(5.0),
        EventRecord::new(3, 1, EventKind::RewardEarned, ts(4, 9)).with_value(7.0),
        EventRecord::new(4, 1, EventKind::ActivityCompleted, ts(8, 15)),
    ];
    let store = MemoryStore::new(users, events, Vec::new()).unwrap();

    let extracted = extract_features(&store, date(11)).await.unwrap();
    assert_eq!(extracted.table.len(), 1);

    let row = &extracted.table.rows[0];
    let columns = &extracted.table.schema.columns;
    let value = |name: &str| row[columns.iter().position(|c| c == name).unwrap()];

    assert_eq!(value("total_events"), 4.0);
    assert_eq!(value("active_days"), 3.0);
    assert_eq!(value("reward_count"), 2.0);
    assert_eq!(value("total_reward_value"), 12.0);
    assert_eq!(value("activities_completed"), 1.0);
    assert!((value("avg_daily_events") - 0.4).abs() < 1e-12);
    assert!((value("activity_ratio") - 0.3).abs() < 1e-12);

    let profile = &extracted.profiles[&UserId(1)];
    assert_eq!(profile.days_to_first_reward, Some(1.0));
    assert!(profile.d7_eligible);
    assert!(profile.d7_retained); // activity on June 8 = signup + 7
}

#[tokio::test]
async fn test_zero_event_user_gets_zero_features() {
    let users = vec![
        User::new(1, date(1), Channel::Paid, "low_potential"),
        User::new(2, date(1), Channel::Organic, "low_potential"),
    ];
    let events = vec![EventRecord::new(
        1,
        2,
        EventKind::AppOpen,
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
    )];
    let store = MemoryStore::new(users, events, Vec::new()).unwrap();

    let extracted = extract_features(&store, date(11)).await.unwrap();
    assert!(extracted.table.rows[0].iter().all(|&v| v == 0.0));
    assert_eq!(extracted.profiles[&UserId(1)].days_to_first_reward, None);
}

#[tokio::test]
async fn test_heterogeneous_effects_per_cluster() {
    // two obvious behavioral tiers, both arms assigned in each tier
    let mut users = Vec::new();
    let mut events = Vec::new();
    let mut assignments = Vec::new();
    let assigned = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
    let converted = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).unwrap();
    let mut next_event = 1u64;

    for id in 1..=40u64 {
        users.push(User::new(id, date(1), Channel::Organic, "medium_potential"));
        let heavy = id <= 20;
        let event_days: &[u32] = if heavy { &[2, 3, 4, 5, 6, 7] } else { &[2] };
        for &d in event_days {
            events.push(EventRecord::new(
                next_event,
                id,
                EventKind::AppOpen,
                Utc.with_ymd_and_hms(2025, 6, d, 10, 0, 0).unwrap(),
            ));
            next_event += 1;
        }
        let group = if id % 2 == 0 {
            Group::Treatment
        } else {
            Group::Control
        };
        let mut assignment = ExperimentAssignment::new(id, group, assigned);
        // heavy treatment users convert
        if heavy && group == Group::Treatment {
            assignment = assignment.converted_at(converted);
        }
        assignments.push(assignment);
    }
    let store = MemoryStore::new(users, events, assignments).unwrap();

    let config = SegmentConfig::new(date(20)).with_k_range(2..=3);
    let report = segment_users(&store, &config).await.unwrap();

    assert_eq!(report.total_users, 40);
    let with_effect = report
        .clusters
        .iter()
        .filter(|c| c.treatment_effect.is_some())
        .count();
    assert!(with_effect > 0, "expected at least one measurable cluster");
    for cluster in &report.clusters {
        if let Some(effect) = &cluster.treatment_effect {
            assert_eq!(
                effect.control.size + effect.treatment.size,
                cluster.size,
                "experiment arms must cover the whole cluster"
            );
        }
    }
}

#[tokio::test]
async fn test_standardization_recorded_per_feature() {
    let mut users = Vec::new();
    let mut events = Vec::new();
    let mut next_event = 1u64;
    for id in 1..=10u64 {
        users.push(User::new(id, date(1), Channel::Organic, "medium_potential"));
        for d in 0..(id as u32 % 5) {
            events.push(EventRecord::new(
                next_event,
                id,
                EventKind::AppOpen,
                Utc.with_ymd_and_hms(2025, 6, 2 + d, 10, 0, 0).unwrap(),
            ));
            next_event += 1;
        }
    }
    let store = MemoryStore::new(users, events, Vec::new()).unwrap();

    let config = SegmentConfig::new(date(20)).with_k_range(2..=3);
    let report = segment_users(&store, &config).await.unwrap();

    assert_eq!(report.standardization.mean.len(), report.schema.len());
    assert_eq!(report.standardization.std_dev.len(), report.schema.len());
    for &s in &report.standardization.std_dev {
        assert!(s > 0.0);
    }
}
