use serde::Serialize;

use super::config::{AbTest, AbTestStatus, Variant};
use super::promotion::{calculate_lift, can_promote, leading_variant};

pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_POWER: f64 = 0.8;

// ── Normal distribution helpers ─────────────────────────────────────

/// Computes P(Z > z) for the standard normal distribution.
/// Abramowitz & Stegun 26.2.17, evaluated with Horner's method.
/// Caller must pass z >= 0.
pub fn normal_sf(z: f64) -> f64 {
    debug_assert!(z >= 0.0, "normal_sf requires z >= 0, got {}", z);

    let t = 1.0 / (1.0 + 0.2316419 * z);
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d * (-z * z / 2.0).exp();

    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));

    p * poly
}

/// Inverse normal CDF (Acklam's rational approximation).
/// Returns z such that P(Z < z) = p.
pub fn z_from_p(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

// ── Two-proportion z-test ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ProportionTest {
    pub z_score: f64,
    pub p_value: f64,
    /// `(1 - p_value) * 100`, clamped to [0, 100].
    pub confidence_pct: f64,
}

impl ProportionTest {
    fn inconclusive() -> Self {
        Self {
            z_score: 0.0,
            p_value: 1.0,
            confidence_pct: 0.0,
        }
    }
}

/// Pooled two-proportion z-test on CTR (clicks / sent) of two variants.
/// Inconclusive when either arm has no sends or the pooled SE is zero.
pub fn two_proportion_z_test(a: &Variant, b: &Variant) -> ProportionTest {
    if a.sent == 0 || b.sent == 0 {
        return ProportionTest::inconclusive();
    }
    let n_a = a.sent as f64;
    let n_b = b.sent as f64;
    let pooled = (a.clicks + b.clicks) as f64 / (n_a + n_b);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return ProportionTest::inconclusive();
    }
    let z = (a.ctr() - b.ctr()) / se;
    let p_value = (2.0 * normal_sf(z.abs())).clamp(0.0, 1.0);
    ProportionTest {
        z_score: z,
        p_value,
        confidence_pct: ((1.0 - p_value) * 100.0).clamp(0.0, 100.0),
    }
}

/// Confidence (whole percent) that the leading variant beats the runner-up.
pub fn observed_confidence(test: &AbTest) -> u8 {
    let mut ranked: Vec<&Variant> = test.variants.iter().collect();
    // Stable sort keeps variant order among equal CTRs.
    ranked.sort_by(|x, y| y.ctr().total_cmp(&x.ctr()));
    match ranked.as_slice() {
        [leader, runner_up, ..] => {
            two_proportion_z_test(leader, runner_up).confidence_pct.floor() as u8
        }
        _ => 0,
    }
}

// ── Sample size estimator ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSizeEstimate {
    pub per_variant: u64,
    pub total: u64,
}

/// Two-proportion power analysis for a two-variant test. Returns the
/// per-variant sends needed to detect a relative lift of `relative_mde`
/// over `baseline_rate`, or `None` when the inputs describe no effect.
pub fn required_sample_size(
    baseline_rate: f64,
    relative_mde: f64,
    alpha: f64,
    power: f64,
) -> Option<SampleSizeEstimate> {
    let p1 = baseline_rate;
    let p2 = (baseline_rate * (1.0 + relative_mde)).min(1.0);
    let delta = (p2 - p1).abs();
    if delta == 0.0 || !(0.0..1.0).contains(&p1) {
        return None;
    }

    let z_alpha = z_from_p(1.0 - alpha / 2.0);
    let z_power = z_from_p(power);
    let p_bar = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_power * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let per_variant = (numerator.powi(2) / delta.powi(2)).ceil() as u64;

    Some(SampleSizeEstimate {
        per_variant,
        total: per_variant * 2,
    })
}

// ── Derived views ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AbTestSummary {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub promoted: usize,
    /// Mean stated confidence across all tests, in percent.
    pub average_confidence: f64,
    pub ready_to_promote: usize,
}

impl AbTestSummary {
    pub fn from_tests(tests: &[AbTest]) -> Self {
        let count = |status: AbTestStatus| tests.iter().filter(|t| t.status == status).count();
        let average_confidence = if tests.is_empty() {
            0.0
        } else {
            tests
                .iter()
                .map(|t| t.confidence_level as f64)
                .sum::<f64>()
                / tests.len() as f64
        };
        Self {
            total: tests.len(),
            running: count(AbTestStatus::Running),
            paused: count(AbTestStatus::Paused),
            completed: count(AbTestStatus::Completed),
            promoted: tests.iter().filter(|t| t.winner.is_some()).count(),
            average_confidence,
            ready_to_promote: tests.iter().filter(|t| can_promote(t)).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct VariantResult {
    pub id: String,
    pub name: String,
    pub sent: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub ctr: f64,
    pub conversion_rate: f64,
    /// Lift in percent against the first (control) variant. The control's own lift is 0.
    pub lift_vs_control: f64,
    pub is_winner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub test_id: String,
    pub status: AbTestStatus,
    pub confidence_level: u8,
    pub observed_confidence: u8,
    pub leader: Option<String>,
    pub winner: Option<String>,
    pub can_promote: bool,
    pub total_sent: u64,
    pub target_sample_size: Option<u64>,
    /// Share of `target_sample_size` reached by the smallest variant, in [0, 1].
    pub sample_progress: Option<f64>,
    pub variants: Vec<VariantResult>,
}

impl TestResults {
    pub fn from_test(test: &AbTest) -> Self {
        let control = test.variants.first();
        let variants = test
            .variants
            .iter()
            .map(|v| VariantResult {
                id: v.id.clone(),
                name: v.name.clone(),
                sent: v.sent,
                clicks: v.clicks,
                conversions: v.conversions,
                ctr: v.ctr(),
                conversion_rate: v.conversion_rate(),
                lift_vs_control: match control {
                    Some(c) if c.id != v.id => calculate_lift(v, c),
                    _ => 0.0,
                },
                is_winner: test.winner.as_deref() == Some(v.id.as_str()),
            })
            .collect();
        let sample_progress = test.target_sample_size.filter(|n| *n > 0).map(|target| {
            let smallest = test.variants.iter().map(|v| v.sent).min().unwrap_or(0);
            (smallest as f64 / target as f64).min(1.0)
        });
        Self {
            test_id: test.id.clone(),
            status: test.status,
            confidence_level: test.confidence_level,
            observed_confidence: observed_confidence(test),
            leader: leading_variant(test).map(|v| v.id.clone()),
            winner: test.winner.clone(),
            can_promote: can_promote(test),
            total_sent: test.total_sent(),
            target_sample_size: test.target_sample_size,
            sample_progress,
            variants,
        }
    }
}
