use serde::Deserialize;

use super::config::{AbTest, AbTestStatus, ConfidenceSource, NewAbTest, Variant};
use super::promotion::{promote_winner, promotion_blocker, PromotionOutcome};
use super::stats::observed_confidence;
use super::store::TestRepository;
use crate::error::{LeadflowError, Result};
use crate::types::{new_id, now_ms};

/// Counter increments reported for one variant.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MetricsIncrement {
    pub variant_id: String,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub conversions: u64,
}

fn status_error(test: &AbTest, action: &str) -> LeadflowError {
    LeadflowError::InvalidStatus(format!(
        "cannot {action} ab test {} while it is {:?}",
        test.id, test.status
    ))
}

pub fn create<R: TestRepository + ?Sized>(repo: &R, form: NewAbTest) -> Result<AbTest> {
    let test = form.into_test()?;
    let created = repo.insert(test)?;
    tracing::info!(
        test_id = %created.id,
        variants = created.variants.len(),
        "ab test created"
    );
    Ok(created)
}

fn transition<R: TestRepository + ?Sized>(
    repo: &R,
    id: &str,
    action: &str,
    allowed_from: &[AbTestStatus],
    to: AbTestStatus,
) -> Result<AbTest> {
    let updated = repo.update(id, &mut |test| {
        if !allowed_from.contains(&test.status) {
            return Err(status_error(test, action));
        }
        let now = now_ms();
        test.status = to;
        test.updated_at = now;
        if to == AbTestStatus::Completed && test.ended_at.is_none() {
            test.ended_at = Some(now);
        }
        Ok(())
    })?;
    tracing::info!(test_id = %id, status = ?to, "ab test {}", action);
    Ok(updated)
}

pub fn pause<R: TestRepository + ?Sized>(repo: &R, id: &str) -> Result<AbTest> {
    transition(repo, id, "pause", &[AbTestStatus::Running], AbTestStatus::Paused)
}

pub fn resume<R: TestRepository + ?Sized>(repo: &R, id: &str) -> Result<AbTest> {
    transition(repo, id, "resume", &[AbTestStatus::Paused], AbTestStatus::Running)
}

pub fn complete<R: TestRepository + ?Sized>(repo: &R, id: &str) -> Result<AbTest> {
    transition(
        repo,
        id,
        "complete",
        &[AbTestStatus::Running, AbTestStatus::Paused],
        AbTestStatus::Completed,
    )
}

/// Promotes the winner of a test.
///
/// Repeating the call on a promoted test returns it unchanged with
/// `AlreadyPromoted`. Otherwise the test must satisfy `can_promote`.
/// Concurrent calls report exactly one fresh promotion.
pub fn promote<R: TestRepository + ?Sized>(
    repo: &R,
    id: &str,
) -> Result<(AbTest, PromotionOutcome)> {
    let test = repo.get(id)?;
    if let Some(winner) = test.winner.clone() {
        return Ok((test, PromotionOutcome::AlreadyPromoted { winner }));
    }
    let mut outcome = None;
    let updated = repo.update(id, &mut |test| {
        if let Some(ref winner) = test.winner {
            outcome = Some(PromotionOutcome::AlreadyPromoted {
                winner: winner.clone(),
            });
            return Ok(());
        }
        if let Some(reason) = promotion_blocker(test) {
            return Err(LeadflowError::InvalidStatus(reason));
        }
        outcome = Some(promote_winner(test)?);
        Ok(())
    })?;
    let outcome = outcome.ok_or_else(|| {
        LeadflowError::InvalidStatus(format!("ab test {id} has no winner"))
    })?;
    if outcome.already_promoted() {
        return Ok((updated, outcome));
    }
    tracing::info!(
        test_id = %id,
        winner = %outcome.winner(),
        confidence = updated.confidence_level,
        "ab test winner promoted"
    );
    Ok((updated, outcome))
}

pub fn record_metrics<R: TestRepository + ?Sized>(
    repo: &R,
    id: &str,
    increment: &MetricsIncrement,
) -> Result<AbTest> {
    repo.update(id, &mut |test| {
        if test.status != AbTestStatus::Running {
            return Err(status_error(test, "record metrics for"));
        }
        let variant = test
            .variants
            .iter_mut()
            .find(|v| v.id == increment.variant_id)
            .ok_or_else(|| LeadflowError::not_found("variant", increment.variant_id.clone()))?;

        let mut next = variant.clone();
        next.sent = next.sent.saturating_add(increment.sent);
        next.clicks = next.clicks.saturating_add(increment.clicks);
        next.conversions = next.conversions.saturating_add(increment.conversions);
        next.check_counters()?;
        *variant = next;

        if test.confidence_source == ConfidenceSource::Observed {
            test.confidence_level = observed_confidence(test);
        }
        test.updated_at = now_ms();
        Ok(())
    })
}

/// Sets a stated confidence level, e.g. from an external analytics run.
pub fn set_confidence<R: TestRepository + ?Sized>(
    repo: &R,
    id: &str,
    level: u8,
) -> Result<AbTest> {
    if level > 100 {
        return Err(LeadflowError::validation(
            "confidenceLevel must be within [0, 100]",
        ));
    }
    repo.update(id, &mut |test| {
        if test.winner.is_some() {
            return Err(LeadflowError::InvalidStatus(format!(
                "ab test {id} is already promoted"
            )));
        }
        test.confidence_level = level;
        test.confidence_source = ConfidenceSource::Stated;
        test.updated_at = now_ms();
        Ok(())
    })
}

/// Copies a test as a fresh running test: new ids, zeroed counters, no winner.
pub fn duplicate<R: TestRepository + ?Sized>(repo: &R, id: &str) -> Result<AbTest> {
    let source = repo.get(id)?;
    let now = now_ms();
    let copy = AbTest {
        id: new_id(),
        name: format!("{} (copy)", source.name),
        status: AbTestStatus::Running,
        variants: source
            .variants
            .iter()
            .map(|v| Variant::new(v.name.clone(), v.message.clone()))
            .collect(),
        confidence_level: match source.confidence_source {
            ConfidenceSource::Observed => 0,
            ConfidenceSource::Stated => source.confidence_level,
        },
        winner: None,
        created_at: now,
        updated_at: now,
        ended_at: None,
        ..source
    };
    repo.insert(copy)
}

pub fn delete<R: TestRepository + ?Sized>(repo: &R, id: &str) -> Result<()> {
    repo.delete(id, &mut |test| {
        if test.status == AbTestStatus::Running {
            return Err(status_error(test, "delete"));
        }
        Ok(())
    })?;
    tracing::info!(test_id = %id, "ab test deleted");
    Ok(())
}
