//! State transitions for follow-up executions. Pure functions over the
//! models; persistence lives in [`super::service`].

use super::model::{
    ExecutionStatus, FollowupExecution, FollowupSequence, FollowupStep, StepRecord,
};
use crate::error::{LeadflowError, Result};
use crate::types::new_id;

/// Starts `sequence` for a contact. The first step runs after its delay.
pub fn start(
    sequence: &FollowupSequence,
    contact_id: &str,
    existing: &[FollowupExecution],
    now: i64,
) -> Result<FollowupExecution> {
    if !sequence.active {
        return Err(LeadflowError::InvalidStatus(format!(
            "follow-up sequence {} is inactive",
            sequence.id
        )));
    }
    if let Some(running) = existing.iter().find(|e| {
        e.sequence_id == sequence.id
            && e.contact_id == contact_id
            && e.status == ExecutionStatus::Active
    }) {
        return Err(LeadflowError::AlreadyExists {
            kind: "follow-up execution",
            id: running.id.clone(),
        });
    }
    let first = sequence
        .steps
        .first()
        .ok_or_else(|| LeadflowError::validation("sequence has no steps"))?;
    Ok(FollowupExecution {
        id: new_id(),
        sequence_id: sequence.id.clone(),
        contact_id: contact_id.to_string(),
        status: ExecutionStatus::Active,
        current_step: 0,
        next_run_at: Some(run_at(now, first)?),
        history: Vec::new(),
        started_at: now,
        completed_at: None,
    })
}

/// Records the current step as sent and schedules the next one, or
/// completes the execution after the last step.
pub fn advance(
    execution: &mut FollowupExecution,
    sequence: &FollowupSequence,
    message: String,
    now: i64,
) -> Result<()> {
    if execution.status != ExecutionStatus::Active {
        return Err(LeadflowError::InvalidStatus(format!(
            "execution {} is {:?}",
            execution.id, execution.status
        )));
    }
    if !execution.is_due(now) {
        return Err(LeadflowError::InvalidStatus(format!(
            "execution {} is not due yet",
            execution.id
        )));
    }
    let next_run_at = match sequence.steps.get(execution.current_step + 1) {
        Some(next) => Some(run_at(now, next)?),
        None => None,
    };
    execution.history.push(StepRecord {
        step: execution.current_step,
        message,
        sent_at: now,
    });
    execution.current_step += 1;
    match next_run_at {
        Some(at) => execution.next_run_at = Some(at),
        None => finish(execution, ExecutionStatus::Completed, now),
    }
    Ok(())
}

/// When `step` is due if scheduled at `now`.
fn run_at(now: i64, step: &FollowupStep) -> Result<i64> {
    now.checked_add(step.delay_ms()).ok_or_else(|| {
        LeadflowError::validation(format!(
            "scheduling {}h after {now} is out of range",
            step.delay_hours
        ))
    })
}

pub fn cancel(execution: &mut FollowupExecution, now: i64) -> Result<()> {
    if execution.status != ExecutionStatus::Active {
        return Err(LeadflowError::InvalidStatus(format!(
            "execution {} is {:?}",
            execution.id, execution.status
        )));
    }
    finish(execution, ExecutionStatus::Cancelled, now);
    Ok(())
}

/// Completes an execution whose sequence no longer has a step at
/// `current_step`, e.g. after steps were removed.
pub fn close_exhausted(execution: &mut FollowupExecution, now: i64) {
    finish(execution, ExecutionStatus::Completed, now);
}

fn finish(execution: &mut FollowupExecution, status: ExecutionStatus, now: i64) {
    execution.status = status;
    execution.next_run_at = None;
    execution.completed_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::followups::model::{FollowupStep, SequenceTrigger, MS_PER_HOUR};

    const T0: i64 = 1_700_000_000_000;

    fn sequence(delays: &[u32]) -> FollowupSequence {
        FollowupSequence {
            id: "seq-1".to_string(),
            name: "Warm lead nurture".to_string(),
            trigger: SequenceTrigger::Manual,
            steps: delays
                .iter()
                .map(|d| FollowupStep {
                    delay_hours: *d,
                    message: Some(format!("step after {d}h")),
                    template_id: None,
                })
                .collect(),
            active: true,
            created_at: T0,
            updated_at: T0,
        }
    }

    #[test]
    fn start_schedules_first_step() {
        let exec = start(&sequence(&[2, 24]), "c1", &[], T0).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Active);
        assert_eq!(exec.current_step, 0);
        assert_eq!(exec.next_run_at, Some(T0 + 2 * MS_PER_HOUR));
    }

    #[test]
    fn start_refuses_inactive_sequence() {
        let mut seq = sequence(&[1]);
        seq.active = false;
        assert!(matches!(
            start(&seq, "c1", &[], T0),
            Err(LeadflowError::InvalidStatus(_))
        ));
    }

    #[test]
    fn start_refuses_duplicate_active_enrollment() {
        let seq = sequence(&[1]);
        let first = start(&seq, "c1", &[], T0).unwrap();
        let err = start(&seq, "c1", std::slice::from_ref(&first), T0).unwrap_err();
        assert!(matches!(err, LeadflowError::AlreadyExists { ref id, .. } if *id == first.id));
        // Another contact is fine.
        assert!(start(&seq, "c2", &[first], T0).is_ok());
    }

    #[test]
    fn start_allows_reenrollment_after_completion() {
        let seq = sequence(&[0]);
        let mut first = start(&seq, "c1", &[], T0).unwrap();
        advance(&mut first, &seq, "hi".into(), T0).unwrap();
        assert_eq!(first.status, ExecutionStatus::Completed);
        assert!(start(&seq, "c1", &[first], T0).is_ok());
    }

    #[test]
    fn advance_walks_steps_then_completes() {
        let seq = sequence(&[0, 24]);
        let mut exec = start(&seq, "c1", &[], T0).unwrap();

        advance(&mut exec, &seq, "first".into(), T0).unwrap();
        assert_eq!(exec.current_step, 1);
        assert_eq!(exec.next_run_at, Some(T0 + 24 * MS_PER_HOUR));

        assert!(advance(&mut exec, &seq, "early".into(), T0 + MS_PER_HOUR).is_err());

        let later = T0 + 25 * MS_PER_HOUR;
        advance(&mut exec, &seq, "second".into(), later).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.next_run_at, None);
        assert_eq!(exec.completed_at, Some(later));
        assert_eq!(exec.history.len(), 2);
        assert_eq!(exec.history[1].message, "second");
        assert_eq!(exec.history[1].step, 1);
    }

    #[test]
    fn advance_completes_when_sequence_shrank() {
        let long = sequence(&[0, 0, 0]);
        let mut exec = start(&long, "c1", &[], T0).unwrap();
        advance(&mut exec, &long, "one".into(), T0).unwrap();
        let short = sequence(&[0]);
        advance(&mut exec, &short, "two".into(), T0).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn cancel_only_active() {
        let seq = sequence(&[1]);
        let mut exec = start(&seq, "c1", &[], T0).unwrap();
        cancel(&mut exec, T0).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert!(exec.next_run_at.is_none());
        assert!(cancel(&mut exec, T0).is_err());
        assert!(advance(&mut exec, &seq, "x".into(), T0 + 10 * MS_PER_HOUR).is_err());
    }

    #[test]
    fn scheduling_past_the_clock_range_is_rejected() {
        let seq = sequence(&[0, 24]);
        assert!(matches!(
            start(&sequence(&[1]), "c1", &[], i64::MAX),
            Err(LeadflowError::Validation(_))
        ));

        let mut exec = start(&seq, "c1", &[], T0).unwrap();
        let err = advance(&mut exec, &seq, "hi".into(), i64::MAX).unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(_)));
        assert_eq!(exec.current_step, 0);
        assert!(exec.history.is_empty());
        assert_eq!(exec.status, ExecutionStatus::Active);
    }
}
