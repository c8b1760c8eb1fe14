//! Behavioral user segmentation
//!
//! Extracts per-user behavioral features, standardizes them, clusters with
//! seeded k-means over a candidate range of k, picks k by silhouette score
//! (elbow heuristic as tie-break), and profiles each cluster: raw feature
//! means, D7 retention, and per-cluster treatment effects reusing the A/B
//! testing engine.

pub mod features;
mod kmeans;

pub use features::{ExtractedFeatures, FeatureSchema, FeatureTable, UserProfile};

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pulse_model::{Group, UserId};
use pulse_store::EventStore;

use crate::abtest::{evaluate_ab_test, GroupSample, TestResult, DEFAULT_ALPHA};
use crate::error::{AnalyticsError, Result};

/// Default candidate cluster counts
pub const DEFAULT_K_RANGE: RangeInclusive<usize> = 2..=7;

/// Default clustering seed
pub const DEFAULT_SEED: u64 = 42;

/// Segmentation run parameters
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Candidate cluster counts, inclusive
    pub k_range: RangeInclusive<usize>,
    /// Seed for every random draw in the run
    pub seed: u64,
    /// Expected feature schema; extraction output is validated against it
    pub schema: FeatureSchema,
    /// Significance level for per-cluster treatment effects
    pub alpha: f64,
    /// Snapshot date for feature windows and retention eligibility
    pub today: NaiveDate,
    /// Seeded restarts per k
    pub n_init: u32,
    /// Lloyd iteration cap per restart
    pub max_iter: u32,
    /// Silhouette scores within this tolerance of the best are tied and
    /// fall through to the elbow heuristic
    pub silhouette_tolerance: f64,
}

impl SegmentConfig {
    /// Defaults: k in 2..=7, seed 42, standard schema, alpha 0.05
    pub fn new(today: NaiveDate) -> Self {
        Self {
            k_range: DEFAULT_K_RANGE,
            seed: DEFAULT_SEED,
            schema: FeatureSchema::standard(),
            alpha: DEFAULT_ALPHA,
            today,
            n_init: 10,
            max_iter: 100,
            silhouette_tolerance: 0.01,
        }
    }

    /// Set the candidate k range
    pub fn with_k_range(mut self, k_range: RangeInclusive<usize>) -> Self {
        self.k_range = k_range;
        self
    }

    /// Set the clustering seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the expected feature schema
    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// Quality diagnostics for one candidate k
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KDiagnostic {
    /// Candidate cluster count
    pub k: usize,
    /// Within-cluster sum of squared distances
    pub inertia: f64,
    /// Mean silhouette score
    pub silhouette: f64,
}

/// Which rule picked the final k
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Best silhouette score, unambiguous
    Silhouette,
    /// Silhouette tie broken by largest relative inertia drop
    Elbow,
}

/// The chosen k and how it was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KSelection {
    /// Final cluster count
    pub chosen_k: usize,
    /// Selection rule that decided it
    pub rule: SelectionRule,
}

/// Per-feature standardization parameters applied before clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardization {
    /// Per-column means
    pub mean: Vec<f64>,
    /// Per-column standard deviations (1.0 recorded for constant columns)
    pub std_dev: Vec<f64>,
}

/// Per-cluster D7 retention counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterRetention {
    /// Members whose D7 horizon has elapsed
    pub eligible: u64,
    /// Eligible members active exactly 7 days after signup
    pub retained: u64,
    /// `retained / eligible`; undefined when nobody is eligible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

/// Profile of one behavioral segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster label
    pub cluster: usize,
    /// Member count
    pub size: u64,
    /// Fraction of the clustered population
    pub share: f64,
    /// Mean of each raw (unstandardized) feature
    pub feature_means: BTreeMap<String, f64>,
    /// Mean days from signup to first reward among members who earned one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_days_to_first_reward: Option<f64>,
    /// D7 retention within the cluster
    pub d7_retention: ClusterRetention,
    /// Treatment vs control conversion inside this cluster; absent when the
    /// cluster lacks assigned users in both groups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_effect: Option<TestResult>,
}

/// Complete segmentation output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    /// Users clustered
    pub total_users: u64,
    /// Feature schema the clustering ran on
    pub schema: FeatureSchema,
    /// Standardization applied before clustering
    pub standardization: Standardization,
    /// Diagnostics for every candidate k
    pub diagnostics: Vec<KDiagnostic>,
    /// The chosen k and the rule that chose it
    pub selection: KSelection,
    /// Cluster label per user
    pub assignments: BTreeMap<UserId, usize>,
    /// Per-cluster profiles
    pub clusters: Vec<ClusterSummary>,
}

/// Segment the store's users by behavioral features
pub async fn segment_users(
    store: &dyn EventStore,
    config: &SegmentConfig,
) -> Result<SegmentationReport> {
    let extracted = features::extract_features(store, config.today).await?;
    extracted.table.validate_schema(&config.schema)?;
    segment_table(&extracted, config)
}

/// Segment an already-extracted feature table
///
/// Split out from [`segment_users`] so callers with custom feature pipelines
/// can reuse the clustering and profiling stages.
pub fn segment_table(
    extracted: &ExtractedFeatures,
    config: &SegmentConfig,
) -> Result<SegmentationReport> {
    let table = &extracted.table;
    let n = table.len();

    // valid candidates need at least one point per cluster and a
    // non-degenerate silhouette (2 <= k <= n - 1)
    let candidates: Vec<usize> = config
        .k_range
        .clone()
        .filter(|&k| k >= 2 && k + 1 <= n)
        .collect();
    if candidates.is_empty() {
        return Err(AnalyticsError::InsufficientData(format!(
            "{n} users cannot support any candidate k in {:?}..={:?}",
            config.k_range.start(),
            config.k_range.end()
        )));
    }

    let (standardized, standardization) = standardize(&table.rows, table.schema.len());

    let mut diagnostics = Vec::with_capacity(candidates.len());
    let mut fits = BTreeMap::new();
    for &k in &candidates {
        let fitted = kmeans::fit(&standardized, k, config.seed, config.n_init, config.max_iter);
        let silhouette = kmeans::silhouette(&standardized, &fitted.labels, k);
        diagnostics.push(KDiagnostic {
            k,
            inertia: fitted.inertia,
            silhouette,
        });
        fits.insert(k, fitted);
    }

    let selection = choose_k(&diagnostics, config.silhouette_tolerance);
    tracing::debug!(
        chosen_k = selection.chosen_k,
        rule = ?selection.rule,
        "selected cluster count"
    );

    let chosen = &fits[&selection.chosen_k];
    let assignments: BTreeMap<UserId, usize> = table
        .user_ids
        .iter()
        .zip(&chosen.labels)
        .map(|(&id, &label)| (id, label))
        .collect();

    let clusters = summarize_clusters(extracted, &chosen.labels, selection.chosen_k, config)?;

    Ok(SegmentationReport {
        total_users: n as u64,
        schema: table.schema.clone(),
        standardization,
        diagnostics,
        selection,
        assignments,
        clusters,
    })
}

/// Zero-mean unit-variance scaling per column; constant columns are only
/// centered
fn standardize(rows: &[Vec<f64>], width: usize) -> (Vec<Vec<f64>>, Standardization) {
    let n = rows.len() as f64;
    let mut mean = vec![0.0; width];
    for row in rows {
        for (m, value) in mean.iter_mut().zip(row) {
            *m += value;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = vec![0.0; width];
    for row in rows {
        for ((v, value), m) in variance.iter_mut().zip(row).zip(&mean) {
            *v += (value - m) * (value - m);
        }
    }
    let std_dev: Vec<f64> = variance
        .iter()
        .map(|v| {
            let s = (v / n).sqrt();
            if s > 0.0 {
                s
            } else {
                1.0
            }
        })
        .collect();

    let standardized = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&mean)
                .zip(&std_dev)
                .map(|((value, m), s)| (value - m) / s)
                .collect()
        })
        .collect();

    (standardized, Standardization { mean, std_dev })
}

/// Silhouette is primary; candidates within the tolerance of the best fall
/// through to the elbow heuristic (largest relative inertia drop from the
/// previous candidate)
fn choose_k(diagnostics: &[KDiagnostic], tolerance: f64) -> KSelection {
    let best_silhouette = diagnostics
        .iter()
        .map(|d| d.silhouette)
        .fold(f64::NEG_INFINITY, f64::max);

    let tied: Vec<usize> = diagnostics
        .iter()
        .enumerate()
        .filter(|(_, d)| d.silhouette >= best_silhouette - tolerance)
        .map(|(i, _)| i)
        .collect();

    if tied.len() == 1 {
        return KSelection {
            chosen_k: diagnostics[tied[0]].k,
            rule: SelectionRule::Silhouette,
        };
    }

    let mut chosen = tied[0];
    let mut best_drop = f64::NEG_INFINITY;
    for &i in &tied {
        let drop = if i == 0 || diagnostics[i - 1].inertia <= 0.0 {
            0.0
        } else {
            (diagnostics[i - 1].inertia - diagnostics[i].inertia) / diagnostics[i - 1].inertia
        };
        if drop > best_drop {
            best_drop = drop;
            chosen = i;
        }
    }

    KSelection {
        chosen_k: diagnostics[chosen].k,
        rule: SelectionRule::Elbow,
    }
}

fn summarize_clusters(
    extracted: &ExtractedFeatures,
    labels: &[usize],
    k: usize,
    config: &SegmentConfig,
) -> Result<Vec<ClusterSummary>> {
    let table = &extracted.table;
    let total = table.len() as f64;

    let mut summaries = Vec::with_capacity(k);
    for cluster in 0..k {
        let member_rows: Vec<usize> = (0..table.len()).filter(|&i| labels[i] == cluster).collect();
        let size = member_rows.len() as u64;

        let mut feature_means = BTreeMap::new();
        if size > 0 {
            for (column, name) in table.schema.columns.iter().enumerate() {
                let sum: f64 = member_rows.iter().map(|&i| table.rows[i][column]).sum();
                feature_means.insert(name.clone(), sum / size as f64);
            }
        }

        // profile aggregates
        let mut reward_latency_sum = 0.0;
        let mut reward_latency_count = 0u64;
        let mut d7_eligible = 0u64;
        let mut d7_retained = 0u64;
        let mut control = GroupSample::new(0, 0);
        let mut treatment = GroupSample::new(0, 0);

        for &i in &member_rows {
            let profile = &extracted.profiles[&table.user_ids[i]];
            if let Some(latency) = profile.days_to_first_reward {
                reward_latency_sum += latency;
                reward_latency_count += 1;
            }
            if profile.d7_eligible {
                d7_eligible += 1;
                if profile.d7_retained {
                    d7_retained += 1;
                }
            }
            if let (Some(group), Some(converted)) = (profile.group, profile.converted) {
                let sample = match group {
                    Group::Control => &mut control,
                    Group::Treatment => &mut treatment,
                };
                sample.size += 1;
                if converted {
                    sample.conversions += 1;
                }
            }
        }

        // a cluster without both experiment arms just has no measurable
        // effect; that never fails the segmentation run
        let treatment_effect = match evaluate_ab_test(control, treatment, config.alpha) {
            Ok(result) => Some(result),
            Err(AnalyticsError::InsufficientData(_)) => None,
            Err(e) => return Err(e),
        };

        summaries.push(ClusterSummary {
            cluster,
            size,
            share: if total > 0.0 { size as f64 / total } else { 0.0 },
            feature_means,
            avg_days_to_first_reward: if reward_latency_count > 0 {
                Some(reward_latency_sum / reward_latency_count as f64)
            } else {
                None
            },
            d7_retention: ClusterRetention {
                eligible: d7_eligible,
                retained: d7_retained,
                rate: if d7_eligible > 0 {
                    Some(d7_retained as f64 / d7_eligible as f64)
                } else {
                    None
                },
            },
            treatment_effect,
        });
    }

    // labels partition the population; sizes must sum back to the total
    debug_assert_eq!(
        summaries.iter().map(|s| s.size).sum::<u64>(),
        table.len() as u64
    );

    Ok(summaries)
}
