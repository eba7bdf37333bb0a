use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::stats;
use crate::error::{LeadflowError, Result};
use crate::storage::Record;
use crate::types::{new_id, now_ms, ratio, require_non_empty, Channel};

/// Confidence (percent) a test must state before its winner may be promoted.
pub const PROMOTION_CONFIDENCE: u8 = 95;

const MAX_NAME_LEN: usize = 120;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AbTest {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    pub status: AbTestStatus,
    pub variants: Vec<Variant>,
    /// Percent in [0, 100].
    pub confidence_level: u8,
    #[serde(default)]
    pub confidence_source: ConfidenceSource,
    pub winner: Option<String>,
    #[serde(default)]
    pub target_sample_size: Option<u64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub ended_at: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AbTestStatus {
    Running,
    Paused,
    Completed,
}

impl AbTestStatus {
    pub const ALL: [AbTestStatus; 3] = [
        AbTestStatus::Running,
        AbTestStatus::Paused,
        AbTestStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AbTestStatus::Running => "running",
            AbTestStatus::Paused => "paused",
            AbTestStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "running" => Ok(AbTestStatus::Running),
            "paused" => Ok(AbTestStatus::Paused),
            "completed" => Ok(AbTestStatus::Completed),
            _ => Err(LeadflowError::validation(format!(
                "invalid status filter: {value}"
            ))),
        }
    }
}

/// Where `confidence_level` comes from. `Stated` values are supplied by the
/// operator or external data; `Observed` values are recomputed from the
/// variant counters on every metrics update.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceSource {
    #[default]
    Stated,
    Observed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub conversions: u64,
}

impl Variant {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            message: message.into(),
            sent: 0,
            clicks: 0,
            conversions: 0,
        }
    }

    /// Click-through rate as a fraction in [0, 1].
    pub fn ctr(&self) -> f64 {
        ratio(self.clicks, self.sent)
    }

    /// Conversions per send, as a fraction in [0, 1].
    pub fn conversion_rate(&self) -> f64 {
        ratio(self.conversions, self.sent)
    }

    pub fn check_counters(&self) -> Result<()> {
        if self.clicks > self.sent {
            return Err(LeadflowError::validation(format!(
                "variant '{}': clicks ({}) exceed sent ({})",
                self.name, self.clicks, self.sent
            )));
        }
        if self.conversions > self.clicks {
            return Err(LeadflowError::validation(format!(
                "variant '{}': conversions ({}) exceed clicks ({})",
                self.name, self.conversions, self.clicks
            )));
        }
        Ok(())
    }
}

impl AbTest {
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn total_sent(&self) -> u64 {
        self.variants.iter().map(|v| v.sent).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.variants.len() < 2 {
            return Err(LeadflowError::validation(
                "an ab test needs at least two variants",
            ));
        }
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for variant in &self.variants {
            if variant.id.trim().is_empty() || variant.name.trim().is_empty() {
                return Err(LeadflowError::validation(
                    "variant id and name must not be empty",
                ));
            }
            if !ids.insert(variant.id.as_str()) {
                return Err(LeadflowError::validation(format!(
                    "duplicate variant id: {}",
                    variant.id
                )));
            }
            if !names.insert(variant.name.trim().to_lowercase()) {
                return Err(LeadflowError::validation(format!(
                    "duplicate variant name: {}",
                    variant.name
                )));
            }
            variant.check_counters()?;
        }
        if self.confidence_level > 100 {
            return Err(LeadflowError::validation(
                "confidenceLevel must be within [0, 100]",
            ));
        }
        if let Some(ref winner) = self.winner {
            if self.variant(winner).is_none() {
                return Err(LeadflowError::validation(format!(
                    "winner '{winner}' is not one of the test's variants"
                )));
            }
            if self.status != AbTestStatus::Completed {
                return Err(LeadflowError::validation(
                    "a test with a winner must be completed",
                ));
            }
        }
        Ok(())
    }
}

impl Record for AbTest {
    const KIND: &'static str = "ab test";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn validate(&self) -> Result<()> {
        AbTest::validate(self)
    }
}

// ── Creation wizard ─────────────────────────────────────────────────

/// The steps of the creation form. Each step validates only its own fields.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Basics,
    Variants,
    Settings,
}

impl WizardStep {
    pub const ORDER: [WizardStep; 3] = [
        WizardStep::Basics,
        WizardStep::Variants,
        WizardStep::Settings,
    ];

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "basics" => Ok(WizardStep::Basics),
            "variants" => Ok(WizardStep::Variants),
            "settings" => Ok(WizardStep::Settings),
            _ => Err(LeadflowError::validation(format!(
                "unknown wizard step: {value}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::Basics => "basics",
            WizardStep::Variants => "variants",
            WizardStep::Settings => "settings",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NewVariant {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// Form payload for creating a test.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NewAbTest {
    #[serde(default)]
    pub name: String,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
    #[serde(default)]
    pub confidence_level: Option<u8>,
    #[serde(default)]
    pub confidence_source: Option<ConfidenceSource>,
    /// Expected CTR of the control, as a fraction in (0, 1).
    #[serde(default)]
    pub baseline_ctr: Option<f64>,
    /// Relative lift to detect, e.g. 0.2 for +20%.
    #[serde(default)]
    pub minimum_detectable_effect: Option<f64>,
}

impl NewAbTest {
    pub fn validate_step(&self, step: WizardStep) -> Result<()> {
        let outcome = match step {
            WizardStep::Basics => self.validate_basics(),
            WizardStep::Variants => self.validate_variants(),
            WizardStep::Settings => self.validate_settings(),
        };
        outcome.map_err(|err| match err {
            LeadflowError::Validation(msg) => {
                LeadflowError::Validation(format!("{} step: {}", step.as_str(), msg))
            }
            other => other,
        })
    }

    /// Runs every step in order and reports the first failure.
    pub fn validate(&self) -> Result<()> {
        for step in WizardStep::ORDER {
            self.validate_step(step)?;
        }
        Ok(())
    }

    fn validate_basics(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(LeadflowError::validation(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if self.channel.is_none() {
            return Err(LeadflowError::MissingField("channel".to_string()));
        }
        Ok(())
    }

    fn validate_variants(&self) -> Result<()> {
        if self.variants.len() < 2 {
            return Err(LeadflowError::validation(
                "at least two variants are required",
            ));
        }
        let mut names = HashSet::new();
        for (i, variant) in self.variants.iter().enumerate() {
            require_non_empty(&format!("variants[{i}].name"), &variant.name)?;
            require_non_empty(&format!("variants[{i}].message"), &variant.message)?;
            if !names.insert(variant.name.trim().to_lowercase()) {
                return Err(LeadflowError::validation(format!(
                    "duplicate variant name: {}",
                    variant.name
                )));
            }
        }
        Ok(())
    }

    fn validate_settings(&self) -> Result<()> {
        if let Some(level) = self.confidence_level {
            if level > 100 {
                return Err(LeadflowError::validation(
                    "confidenceLevel must be within [0, 100]",
                ));
            }
        }
        match (self.baseline_ctr, self.minimum_detectable_effect) {
            (None, None) => Ok(()),
            (Some(baseline), Some(mde)) => {
                if !(baseline > 0.0 && baseline < 1.0) {
                    return Err(LeadflowError::validation(
                        "baselineCtr must be in (0, 1) exclusive",
                    ));
                }
                if !(mde > 0.0) {
                    return Err(LeadflowError::validation(
                        "minimumDetectableEffect must be positive",
                    ));
                }
                Ok(())
            }
            _ => Err(LeadflowError::validation(
                "baselineCtr and minimumDetectableEffect must be supplied together",
            )),
        }
    }

    /// Validates the whole form and builds a running test with zero counters.
    pub fn into_test(self) -> Result<AbTest> {
        self.validate()?;
        let target_sample_size = match (self.baseline_ctr, self.minimum_detectable_effect) {
            (Some(baseline), Some(mde)) => {
                let estimate = stats::required_sample_size(
                    baseline,
                    mde,
                    stats::DEFAULT_ALPHA,
                    stats::DEFAULT_POWER,
                );
                estimate.map(|e| e.per_variant)
            }
            _ => None,
        };
        let now = now_ms();
        let channel = self
            .channel
            .ok_or_else(|| LeadflowError::MissingField("channel".to_string()))?;
        Ok(AbTest {
            id: new_id(),
            name: self.name.trim().to_string(),
            channel,
            campaign_id: self.campaign_id,
            hypothesis: self.hypothesis,
            status: AbTestStatus::Running,
            variants: self
                .variants
                .into_iter()
                .map(|v| Variant::new(v.name.trim(), v.message))
                .collect(),
            confidence_level: self.confidence_level.unwrap_or(0),
            confidence_source: self.confidence_source.unwrap_or_default(),
            winner: None,
            target_sample_size,
            created_at: now,
            updated_at: now,
            ended_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, sent: u64, clicks: u64) -> Variant {
        Variant {
            id: id.to_string(),
            name: format!("Variant {id}"),
            message: "Hey! Check out our new drop".to_string(),
            sent,
            clicks,
            conversions: 0,
        }
    }

    fn valid_test() -> AbTest {
        AbTest {
            id: "t1".to_string(),
            name: "Spring promo opener".to_string(),
            channel: Channel::Instagram,
            campaign_id: None,
            hypothesis: None,
            status: AbTestStatus::Running,
            variants: vec![variant("a", 100, 42), variant("b", 100, 49)],
            confidence_level: 80,
            confidence_source: ConfidenceSource::Stated,
            winner: None,
            target_sample_size: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            ended_at: None,
        }
    }

    fn valid_form() -> NewAbTest {
        NewAbTest {
            name: "Subject line test".to_string(),
            channel: Some(Channel::Email),
            variants: vec![
                NewVariant {
                    name: "A".to_string(),
                    message: "Last chance!".to_string(),
                },
                NewVariant {
                    name: "B".to_string(),
                    message: "Only 24 hours left".to_string(),
                },
            ],
            confidence_level: Some(90),
            ..Default::default()
        }
    }

    #[test]
    fn variant_ctr_is_fraction() {
        let v = variant("a", 200, 50);
        assert!((v.ctr() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn variant_ctr_zero_when_nothing_sent() {
        assert_eq!(variant("a", 0, 0).ctr(), 0.0);
    }

    #[test]
    fn validate_valid_test_succeeds() {
        assert!(valid_test().validate().is_ok());
    }

    #[test]
    fn validate_rejects_single_variant() {
        let mut t = valid_test();
        t.variants.truncate(1);
        assert!(matches!(t.validate(), Err(LeadflowError::Validation(_))));
    }

    #[test]
    fn validate_rejects_clicks_above_sent() {
        let mut t = valid_test();
        t.variants[0].clicks = 101;
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_conversions_above_clicks() {
        let mut t = valid_test();
        t.variants[0].conversions = 43;
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_winner() {
        let mut t = valid_test();
        t.status = AbTestStatus::Completed;
        t.winner = Some("zzz".to_string());
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_winner_on_running_test() {
        let mut t = valid_test();
        t.winner = Some("a".to_string());
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_confidence_above_100() {
        let mut t = valid_test();
        t.confidence_level = 101;
        assert!(t.validate().is_err());
    }

    #[test]
    fn wizard_basics_requires_name() {
        let mut form = valid_form();
        form.name = "   ".to_string();
        assert_eq!(
            form.validate_step(WizardStep::Basics),
            Err(LeadflowError::MissingField("name".to_string()))
        );
    }

    #[test]
    fn wizard_basics_requires_channel() {
        let mut form = valid_form();
        form.channel = None;
        assert!(matches!(
            form.validate_step(WizardStep::Basics),
            Err(LeadflowError::MissingField(f)) if f == "channel"
        ));
    }

    #[test]
    fn wizard_steps_validate_independently() {
        let mut form = valid_form();
        form.variants.truncate(1);
        assert!(form.validate_step(WizardStep::Basics).is_ok());
        assert!(form.validate_step(WizardStep::Settings).is_ok());
        let err = form.validate_step(WizardStep::Variants).unwrap_err();
        assert!(err.to_string().contains("variants step"));
    }

    #[test]
    fn wizard_variants_rejects_duplicate_names() {
        let mut form = valid_form();
        form.variants[1].name = " a ".to_string();
        assert!(form.validate_step(WizardStep::Variants).is_err());
    }

    #[test]
    fn wizard_variants_requires_messages() {
        let mut form = valid_form();
        form.variants[0].message.clear();
        assert!(matches!(
            form.validate_step(WizardStep::Variants),
            Err(LeadflowError::MissingField(f)) if f == "variants[0].message"
        ));
    }

    #[test]
    fn wizard_settings_requires_baseline_and_mde_together() {
        let mut form = valid_form();
        form.baseline_ctr = Some(0.1);
        assert!(form.validate_step(WizardStep::Settings).is_err());
        form.minimum_detectable_effect = Some(0.2);
        assert!(form.validate_step(WizardStep::Settings).is_ok());
    }

    #[test]
    fn wizard_settings_rejects_baseline_out_of_range() {
        let mut form = valid_form();
        form.baseline_ctr = Some(1.5);
        form.minimum_detectable_effect = Some(0.2);
        assert!(form.validate_step(WizardStep::Settings).is_err());
    }

    #[test]
    fn validate_reports_first_failing_step() {
        let mut form = valid_form();
        form.name.clear();
        form.variants.clear();
        assert!(matches!(
            form.validate(),
            Err(LeadflowError::MissingField(f)) if f == "name"
        ));
    }

    #[test]
    fn into_test_starts_running_with_zero_counters() {
        let test = valid_form().into_test().unwrap();
        assert_eq!(test.status, AbTestStatus::Running);
        assert_eq!(test.confidence_level, 90);
        assert!(test.winner.is_none());
        assert_eq!(test.variants.len(), 2);
        assert!(test.variants.iter().all(|v| v.sent == 0 && v.clicks == 0));
        assert_ne!(test.variants[0].id, test.variants[1].id);
        assert!(test.target_sample_size.is_none());
        assert!(test.validate().is_ok());
    }

    #[test]
    fn into_test_computes_target_sample_size() {
        let mut form = valid_form();
        form.baseline_ctr = Some(0.10);
        form.minimum_detectable_effect = Some(0.20);
        let test = form.into_test().unwrap();
        let n = test.target_sample_size.unwrap();
        // Two-proportion power analysis for 10% -> 12% at alpha 0.05, power 0.8
        assert!((3700..=3900).contains(&n), "got {n}");
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!(
            AbTestStatus::parse("PAUSED").unwrap(),
            AbTestStatus::Paused
        );
        assert!(AbTestStatus::parse("draft").is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(valid_test()).unwrap();
        assert_eq!(json["confidenceLevel"], 80);
        assert_eq!(json["status"], "running");
        assert_eq!(json["confidenceSource"], "stated");
        assert!(json["winner"].is_null());
    }
}
