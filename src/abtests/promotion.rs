//! Winner promotion rules.
//!
//! A test may be promoted once it is completed, has no winner yet and states
//! at least [`PROMOTION_CONFIDENCE`] percent confidence. Promotion picks the
//! variant with the highest CTR (first one wins ties), records it as the
//! winner and freezes the test. It cannot be undone.

use super::config::{AbTest, AbTestStatus, Variant, PROMOTION_CONFIDENCE};
use crate::error::{LeadflowError, Result};
use crate::types::now_ms;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    Promoted { winner: String },
    /// The test already had a winner; nothing changed.
    AlreadyPromoted { winner: String },
}

impl PromotionOutcome {
    pub fn winner(&self) -> &str {
        match self {
            PromotionOutcome::Promoted { winner } | PromotionOutcome::AlreadyPromoted { winner } => {
                winner
            }
        }
    }

    pub fn already_promoted(&self) -> bool {
        matches!(self, PromotionOutcome::AlreadyPromoted { .. })
    }
}

pub fn can_promote(test: &AbTest) -> bool {
    test.status == AbTestStatus::Completed
        && test.winner.is_none()
        && test.confidence_level >= PROMOTION_CONFIDENCE
}

/// Why `can_promote` is false, for error messages. `None` when promotable.
pub fn promotion_blocker(test: &AbTest) -> Option<String> {
    if let Some(ref winner) = test.winner {
        return Some(format!("winner already promoted: {winner}"));
    }
    if test.status != AbTestStatus::Completed {
        return Some(format!(
            "test must be completed before promotion (status is {:?})",
            test.status
        ));
    }
    if test.confidence_level < PROMOTION_CONFIDENCE {
        return Some(format!(
            "confidence level {}% is below the {}% promotion threshold",
            test.confidence_level, PROMOTION_CONFIDENCE
        ));
    }
    None
}

/// Variant with the highest CTR; the first one in variant order wins ties.
pub fn leading_variant(test: &AbTest) -> Option<&Variant> {
    let mut best: Option<&Variant> = None;
    for variant in &test.variants {
        match best {
            Some(current) if variant.ctr() <= current.ctr() => {}
            _ => best = Some(variant),
        }
    }
    best
}

/// Picks the max-CTR variant as winner and completes the test.
///
/// Idempotent: a test that already has a winner is left untouched and the
/// existing winner is reported. Eligibility (`can_promote`) is the caller's
/// concern.
pub fn promote_winner(test: &mut AbTest) -> Result<PromotionOutcome> {
    if let Some(ref winner) = test.winner {
        return Ok(PromotionOutcome::AlreadyPromoted {
            winner: winner.clone(),
        });
    }
    if test.variants.len() < 2 {
        return Err(LeadflowError::validation(
            "promotion needs at least two variants",
        ));
    }
    let winner = leading_variant(test)
        .map(|v| v.id.clone())
        .ok_or_else(|| LeadflowError::validation("test has no variants"))?;

    let now = now_ms();
    test.winner = Some(winner.clone());
    test.status = AbTestStatus::Completed;
    test.ended_at.get_or_insert(now);
    test.updated_at = now;
    Ok(PromotionOutcome::Promoted { winner })
}

/// Relative CTR difference of `a` over `b`, in percent. Zero when `b` has no CTR.
pub fn calculate_lift(a: &Variant, b: &Variant) -> f64 {
    lift(a.ctr(), b.ctr())
}

pub fn lift(a_ctr: f64, b_ctr: f64) -> f64 {
    if b_ctr == 0.0 {
        return 0.0;
    }
    (a_ctr - b_ctr) / b_ctr * 100.0
}
