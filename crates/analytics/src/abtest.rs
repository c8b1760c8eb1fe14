//! A/B test hypothesis testing
//!
//! Turns two conversion samples into a statistical verdict: two-proportion
//! z-test, chi-square cross-check, Cohen's h, lift, Wald confidence
//! interval, and post-hoc power. The verdict always ships with the raw
//! numbers behind it; nothing is collapsed to a bare boolean.

use serde::{Deserialize, Serialize};

use pulse_model::Group;
use pulse_store::{AssignmentFilter, EventStore};

use crate::error::{AnalyticsError, Result};
use crate::stats::{self, Chi2Test};

/// Default significance level
pub const DEFAULT_ALPHA: f64 = 0.05;

/// One experiment group's conversion sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSample {
    /// Number of users in the group
    pub size: u64,
    /// Number of users who converted
    pub conversions: u64,
}

impl GroupSample {
    /// Create a new sample
    pub fn new(size: u64, conversions: u64) -> Self {
        Self { size, conversions }
    }

    /// Conversion rate; meaningless for an empty group
    pub fn rate(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.conversions as f64 / self.size as f64
        }
    }

    fn validate(&self, group: Group) -> Result<()> {
        if self.size == 0 {
            return Err(AnalyticsError::InsufficientData(format!(
                "{group} group is empty"
            )));
        }
        if self.conversions > self.size {
            return Err(AnalyticsError::InvalidInput(format!(
                "{group} group has {} conversions out of {} users",
                self.conversions, self.size
            )));
        }
        Ok(())
    }
}

/// Per-group numbers as reported in a [`TestResult`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    /// Number of users in the group
    pub size: u64,
    /// Number of users who converted
    pub conversions: u64,
    /// Conversion rate
    pub conversion_rate: f64,
}

impl From<GroupSample> for GroupResult {
    fn from(sample: GroupSample) -> Self {
        Self {
            size: sample.size,
            conversions: sample.conversions,
            conversion_rate: sample.rate(),
        }
    }
}

/// Wald confidence interval on the rate difference, clipped to [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Confidence level (1 - alpha)
    pub confidence: f64,
}

/// Ship/hold recommendation derived from the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Significant improvement: deploy the treatment
    DeployTreatment,
    /// No significant improvement: keep control or gather more data
    KeepControl,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeployTreatment => write!(f, "deploy treatment"),
            Self::KeepControl => write!(f, "keep control or run longer test"),
        }
    }
}

/// Complete statistical verdict for one A/B test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Control group numbers
    pub control: GroupResult,
    /// Treatment group numbers
    pub treatment: GroupResult,
    /// Two-proportion z statistic (pooled standard error under H0)
    pub z_statistic: f64,
    /// Two-sided p-value of the z-test
    pub p_value: f64,
    /// Chi-square test of independence on the same 2x2 table
    pub chi_square: Chi2Test,
    /// Whether z-test and chi-square agree on significance at `alpha`
    pub tests_concordant: bool,
    /// Cohen's h effect size
    pub cohens_h: f64,
    /// Relative lift (treatment - control) / control; undefined when the
    /// control rate is zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_lift: Option<f64>,
    /// Absolute lift in rate points
    pub absolute_lift: f64,
    /// Confidence interval on the rate difference
    pub confidence_interval: ConfidenceInterval,
    /// Post-hoc achieved power for the observed effect
    pub power: f64,
    /// Significance level the verdict was evaluated at
    pub alpha: f64,
    /// Reject H0 iff `p_value < alpha`
    pub significant: bool,
    /// Derived recommendation
    pub recommendation: Recommendation,
}

/// Evaluate an A/B test from two conversion samples
///
/// Fails with `InsufficientData` when either group is empty and
/// `InvalidInput` when conversions exceed the group size or `alpha` is not
/// in (0, 1).
pub fn evaluate_ab_test(
    control: GroupSample,
    treatment: GroupSample,
    alpha: f64,
) -> Result<TestResult> {
    if alpha <= 0.0 || alpha >= 1.0 {
        return Err(AnalyticsError::InvalidInput(format!(
            "alpha must be in (0, 1), got {alpha}"
        )));
    }
    control.validate(Group::Control)?;
    treatment.validate(Group::Treatment)?;

    let n_c = control.size as f64;
    let n_t = treatment.size as f64;
    let p_c = control.rate();
    let p_t = treatment.rate();

    // z-test with the pooled proportion under H0
    let pooled = (control.conversions + treatment.conversions) as f64 / (n_c + n_t);
    let se_pooled = (pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt();
    let z_statistic = if se_pooled > 0.0 {
        (p_t - p_c) / se_pooled
    } else {
        0.0
    };
    let p_value = stats::two_sided_p(z_statistic);

    // chi-square cross-check on the equivalent 2x2 table
    let chi_square = stats::chi_square_2x2([
        [control.conversions, control.size - control.conversions],
        [treatment.conversions, treatment.size - treatment.conversions],
    ]);
    let significant = p_value < alpha;
    let tests_concordant = significant == (chi_square.p_value < alpha);
    if !tests_concordant {
        tracing::warn!(
            z_p = p_value,
            chi2_p = chi_square.p_value,
            alpha,
            "z-test and chi-square disagree on significance"
        );
    }

    // effect size and lift
    let cohens_h = stats::cohens_h(p_c, p_t);
    let relative_lift = if p_c > 0.0 {
        Some((p_t - p_c) / p_c)
    } else {
        None
    };
    let absolute_lift = p_t - p_c;

    // Wald interval on the rate difference with the unpooled standard error
    let se_unpooled = (p_c * (1.0 - p_c) / n_c + p_t * (1.0 - p_t) / n_t).sqrt();
    let z_crit = stats::normal_quantile(1.0 - alpha / 2.0);
    let confidence_interval = ConfidenceInterval {
        lower: (absolute_lift - z_crit * se_unpooled).max(-1.0),
        upper: (absolute_lift + z_crit * se_unpooled).min(1.0),
        confidence: 1.0 - alpha,
    };

    let power = stats::achieved_power(p_c, p_t, control.size, treatment.size, alpha);

    let recommendation = if significant && p_t > p_c {
        Recommendation::DeployTreatment
    } else {
        Recommendation::KeepControl
    };

    Ok(TestResult {
        control: control.into(),
        treatment: treatment.into(),
        z_statistic,
        p_value,
        chi_square,
        tests_concordant,
        cohens_h,
        relative_lift,
        absolute_lift,
        confidence_interval,
        power,
        alpha,
        significant,
        recommendation,
    })
}

/// Group the experiment assignments in a store into the two conversion samples
pub async fn conversion_samples(store: &dyn EventStore) -> Result<(GroupSample, GroupSample)> {
    let mut samples = [GroupSample::new(0, 0), GroupSample::new(0, 0)];
    for (slot, group) in samples.iter_mut().zip([Group::Control, Group::Treatment]) {
        let assignments = store
            .assignments(&AssignmentFilter::all().with_group(group))
            .await?;
        slot.size = assignments.len() as u64;
        slot.conversions = assignments.iter().filter(|a| a.converted).count() as u64;
    }
    let [control, treatment] = samples;

    tracing::debug!(
        control_size = control.size,
        control_conversions = control.conversions,
        treatment_size = treatment.size,
        treatment_conversions = treatment.conversions,
        "collected conversion samples"
    );

    Ok((control, treatment))
}
