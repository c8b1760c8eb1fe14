//! Tests for report assembly and the engine facade

use chrono::{NaiveDate, TimeZone, Utc};

use pulse_model::{Channel, EventKind, EventRecord, ExperimentAssignment, Group, User};
use pulse_store::MemoryStore;

use crate::engine::{AnalyticsEngine, RunConfig};
use crate::error::AnalyticsError;
use crate::report::{ReportBuilder, REPORT_VERSION};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

/// A small but complete population: two behavioral tiers, both experiment
/// arms populated, activity spread over the first week
fn fixture_store() -> MemoryStore {
    let mut users = Vec::new();
    let mut events = Vec::new();
    let mut assignments = Vec::new();
    let assigned = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
    let converted = Utc.with_ymd_and_hms(2025, 6, 3, 8, 0, 0).unwrap();
    let mut next_event = 1u64;

    for id in 1..=40u64 {
        users.push(User::new(id, date(1), Channel::Organic, "medium_potential"));
        let heavy = id <= 20;
        let event_days: &[u32] = if heavy { &[1, 2, 3, 5, 8] } else { &[2] };
        for &d in event_days {
            events.push(EventRecord::new(
                next_event,
                id,
                EventKind::AppOpen,
                Utc.with_ymd_and_hms(2025, 6, d, 10, 0, 0).unwrap(),
            ));
            next_event += 1;
        }
        if heavy {
            events.push(
                EventRecord::new(next_event, id, EventKind::RewardEarned, assigned)
                    .with_value(3.0),
            );
            next_event += 1;
        }
        let group = if id % 2 == 0 {
            Group::Treatment
        } else {
            Group::Control
        };
        let mut assignment = ExperimentAssignment::new(id, group, assigned);
        if heavy && group == Group::Treatment {
            assignment = assignment.converted_at(converted);
        }
        assignments.push(assignment);
    }
    MemoryStore::new(users, events, assignments).unwrap()
}

#[tokio::test]
async fn test_run_all_assembles_consistent_report() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));

    let report = engine.run_all(&config).await.unwrap();

    assert_eq!(report.version, REPORT_VERSION);
    assert_eq!(report.segmentation.total_users, 40);
    assert_eq!(report.ab_test.control.size + report.ab_test.treatment.size, 40);
    assert!(!report.retention.overall.is_empty());
    assert!(report.retention.split.is_some());
}

#[tokio::test]
async fn test_report_serde_shape() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));
    let report = engine.run_all(&config).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    for key in ["version", "generated_at", "retention", "ab_test", "segmentation"] {
        assert!(json.get(key).is_some(), "missing top-level key {key}");
    }

    let decoded: crate::report::AnalysisReport =
        serde_json::from_value(json).unwrap();
    assert_eq!(decoded, report);
}

#[tokio::test]
async fn test_sub_analyses_match_run_all() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));

    let report = engine.run_all(&config).await.unwrap();
    let retention = engine.retention(&config).await.unwrap();
    let ab_test = engine.ab_test(&config).await.unwrap();
    let segmentation = engine.segmentation(&config).await.unwrap();

    assert_eq!(report.retention, retention);
    assert_eq!(report.ab_test, ab_test);
    assert_eq!(report.segmentation, segmentation);
}

#[tokio::test]
async fn test_builder_rejects_missing_sub_results() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));
    let retention = engine.retention(&config).await.unwrap();
    let ab_test = engine.ab_test(&config).await.unwrap();

    let err = ReportBuilder::new()
        .with_retention(retention)
        .with_ab_test(ab_test)
        .build(Utc::now())
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::IncompleteAnalysis(_)));

    let err = ReportBuilder::new().build(Utc::now()).unwrap_err();
    assert!(matches!(err, AnalyticsError::IncompleteAnalysis(_)));
}

#[tokio::test]
async fn test_builder_rejects_inconsistent_segmentation() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));
    let retention = engine.retention(&config).await.unwrap();
    let ab_test = engine.ab_test(&config).await.unwrap();
    let mut segmentation = engine.segmentation(&config).await.unwrap();

    // corrupt the population total so cluster sizes no longer partition it
    segmentation.total_users += 1;

    let err = ReportBuilder::new()
        .with_retention(retention)
        .with_ab_test(ab_test)
        .with_segmentation(segmentation)
        .build(Utc::now())
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::IncompleteAnalysis(_)));
}

#[tokio::test]
async fn test_builder_rejects_wrong_expected_population() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20));
    let retention = engine.retention(&config).await.unwrap();
    let ab_test = engine.ab_test(&config).await.unwrap();
    let segmentation = engine.segmentation(&config).await.unwrap();

    let err = ReportBuilder::new()
        .with_retention(retention)
        .with_ab_test(ab_test)
        .with_segmentation(segmentation)
        .with_expected_users(41)
        .build(Utc::now())
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::IncompleteAnalysis(_)));
}

#[tokio::test]
async fn test_alpha_propagates_to_every_test() {
    let engine = AnalyticsEngine::new(Box::new(fixture_store()));
    let config = RunConfig::new(date(20)).with_alpha(0.01);

    let report = engine.run_all(&config).await.unwrap();
    assert_eq!(report.ab_test.alpha, 0.01);
    for cluster in &report.segmentation.clusters {
        if let Some(effect) = &cluster.treatment_effect {
            assert_eq!(effect.alpha, 0.01);
        }
    }

    let split = report.retention.split.unwrap();
    assert_eq!(split.alpha, 0.01);
    for comparison in &split.comparisons {
        assert_eq!(comparison.significant, comparison.chi_square.p_value < 0.01);
    }
}

#[test]
fn test_run_config_keeps_sub_analyses_on_one_snapshot() {
    use crate::retention::RetentionRequest;
    use crate::segment::SegmentConfig;

    // sub-configs built against a different date are snapped to the run's
    let config = RunConfig::new(date(20))
        .with_alpha(0.01)
        .with_retention(RetentionRequest::new(date(5)))
        .with_segmentation(SegmentConfig::new(date(5)));

    assert_eq!(config.retention.today, date(20));
    assert_eq!(config.retention.alpha, 0.01);
    assert_eq!(config.segmentation.today, date(20));
    assert_eq!(config.segmentation.alpha, 0.01);
}
