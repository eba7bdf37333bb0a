use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use super::engine;
use super::model::{
    ExecutionStatus, FollowupExecution, FollowupSequence, SequenceInput, SequenceTrigger,
};
use crate::contacts::{Contact, ContactStore};
use crate::error::{LeadflowError, Result};
use crate::storage::JsonStore;
use crate::templates::{contact_variables, render_body, TemplateStore};
use crate::types::InterestLevel;

#[derive(Debug, Default, Clone)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub sequence_id: Option<String>,
    pub contact_id: Option<String>,
}

impl ExecutionFilter {
    fn matches(&self, execution: &FollowupExecution) -> bool {
        self.status.map_or(true, |s| s == execution.status)
            && self
                .sequence_id
                .as_deref()
                .map_or(true, |id| id == execution.sequence_id)
            && self
                .contact_id
                .as_deref()
                .map_or(true, |id| id == execution.contact_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub execution_id: String,
    pub reason: String,
}

/// What one `run_due` pass did.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub advanced: Vec<FollowupExecution>,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.advanced
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count()
    }
}

/// Sequences and their per-contact executions.
pub struct Followups {
    sequences: JsonStore<FollowupSequence>,
    executions: JsonStore<FollowupExecution>,
    /// Held while checking and changing which executions exist, so enrolling
    /// and deleting a sequence see a consistent set of active executions.
    membership: Mutex<()>,
}

impl Followups {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            sequences: JsonStore::open(data_dir, "followup_sequences")?,
            executions: JsonStore::open(data_dir, "followup_executions")?,
            membership: Mutex::new(()),
        })
    }

    fn lock_membership(&self) -> std::sync::MutexGuard<'_, ()> {
        self.membership.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Sequences ───────────────────────────────────────────────────

    pub fn create_sequence(&self, input: SequenceInput) -> Result<FollowupSequence> {
        let sequence = self.sequences.insert(input.into_sequence()?)?;
        tracing::info!(sequence_id = %sequence.id, steps = sequence.steps.len(), "follow-up sequence created");
        Ok(sequence)
    }

    pub fn get_sequence(&self, id: &str) -> Result<FollowupSequence> {
        self.sequences.get(id)
    }

    pub fn update_sequence(&self, id: &str, input: SequenceInput) -> Result<FollowupSequence> {
        self.sequences
            .update(id, |sequence| input.apply_to(sequence))
    }

    /// Refused while any execution of the sequence is still active.
    pub fn delete_sequence(&self, id: &str) -> Result<FollowupSequence> {
        let _guard = self.lock_membership();
        let active = self
            .executions
            .filter(|e| e.sequence_id == id && e.status == ExecutionStatus::Active)
            .len();
        if active > 0 {
            return Err(LeadflowError::InvalidStatus(format!(
                "follow-up sequence {id} has {active} active executions"
            )));
        }
        self.sequences.remove(id)
    }

    pub fn list_sequences(&self, active: Option<bool>) -> Vec<FollowupSequence> {
        self.sequences
            .filter(|s| active.map_or(true, |a| a == s.active))
    }

    // ── Executions ──────────────────────────────────────────────────

    pub fn get_execution(&self, id: &str) -> Result<FollowupExecution> {
        self.executions.get(id)
    }

    pub fn list_executions(&self, filter: &ExecutionFilter) -> Vec<FollowupExecution> {
        self.executions.filter(|e| filter.matches(e))
    }

    pub fn enroll(
        &self,
        sequence_id: &str,
        contact: &Contact,
        now: i64,
    ) -> Result<FollowupExecution> {
        let _guard = self.lock_membership();
        let sequence = self.sequences.get(sequence_id)?;
        let existing = self
            .executions
            .filter(|e| e.contact_id == contact.id && e.sequence_id == sequence.id);
        let execution = engine::start(&sequence, &contact.id, &existing, now)?;
        let execution = self.executions.insert(execution)?;
        tracing::info!(
            execution_id = %execution.id,
            sequence_id = %sequence.id,
            contact_id = %contact.id,
            "contact enrolled in follow-up sequence"
        );
        Ok(execution)
    }

    /// Enrolls a contact into every active sequence triggered by `level`.
    /// Sequences the contact is already running are skipped.
    pub fn auto_enroll(
        &self,
        contact: &Contact,
        level: InterestLevel,
        now: i64,
    ) -> Vec<FollowupExecution> {
        let trigger = SequenceTrigger::Interest { level };
        let mut enrolled = Vec::new();
        for sequence in self.sequences.filter(|s| s.active && s.trigger == trigger) {
            match self.enroll(&sequence.id, contact, now) {
                Ok(execution) => enrolled.push(execution),
                Err(LeadflowError::AlreadyExists { .. }) => {}
                Err(err) => tracing::warn!(
                    sequence_id = %sequence.id,
                    contact_id = %contact.id,
                    error = %err,
                    "auto-enrollment failed"
                ),
            }
        }
        enrolled
    }

    pub fn cancel(&self, execution_id: &str, now: i64) -> Result<FollowupExecution> {
        let execution = self
            .executions
            .update(execution_id, |execution| engine::cancel(execution, now))?;
        tracing::info!(execution_id = %execution_id, "follow-up execution cancelled");
        Ok(execution)
    }

    /// Cancels every active execution of a contact, e.g. when it is deleted.
    pub fn cancel_for_contact(&self, contact_id: &str, now: i64) -> Result<Vec<FollowupExecution>> {
        let _guard = self.lock_membership();
        let active = self.executions.filter(|e| {
            e.contact_id == contact_id && e.status == ExecutionStatus::Active
        });
        let mut cancelled = Vec::with_capacity(active.len());
        for execution in active {
            match self
                .executions
                .update(&execution.id, |execution| engine::cancel(execution, now))
            {
                Ok(done) => cancelled.push(done),
                // Finished by a concurrent run in the meantime.
                Err(LeadflowError::InvalidStatus(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if !cancelled.is_empty() {
            tracing::info!(
                contact_id = %contact_id,
                cancelled = cancelled.len(),
                "follow-up executions cancelled for contact"
            );
        }
        Ok(cancelled)
    }

    /// Sends the current step of a due execution. The execution stays
    /// locked while the step is sent, so each step goes out once.
    /// Executions whose contact no longer exists are cancelled.
    pub fn advance(
        &self,
        execution_id: &str,
        contacts: &ContactStore,
        templates: &TemplateStore,
        now: i64,
    ) -> Result<FollowupExecution> {
        self.executions.update(execution_id, |execution| {
            if !execution.is_due(now) {
                return Err(LeadflowError::InvalidStatus(format!(
                    "execution {execution_id} is not due"
                )));
            }
            let sequence = self.sequences.get(&execution.sequence_id)?;
            match step_message(execution, &sequence, contacts, templates) {
                Ok(Some(message)) => engine::advance(execution, &sequence, message, now),
                Ok(None) => {
                    engine::close_exhausted(execution, now);
                    Ok(())
                }
                Err(LeadflowError::NotFound { kind: "contact", .. }) => {
                    tracing::info!(
                        execution_id = %execution_id,
                        contact_id = %execution.contact_id,
                        "contact is gone, cancelling follow-up execution"
                    );
                    engine::cancel(execution, now)
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Advances every due execution. Executions of inactive sequences wait;
    /// executions whose message cannot be produced are reported and retried
    /// on the next pass.
    pub fn run_due(
        &self,
        contacts: &ContactStore,
        templates: &TemplateStore,
        now: i64,
    ) -> RunReport {
        let mut report = RunReport::default();
        for execution in self.executions.filter(|e| e.is_due(now)) {
            match self.sequences.get(&execution.sequence_id) {
                Ok(sequence) if !sequence.active => continue,
                Ok(_) => {}
                Err(err) => {
                    report.failures.push(RunFailure {
                        execution_id: execution.id.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
            match self.advance(&execution.id, contacts, templates, now) {
                Ok(advanced) => report.advanced.push(advanced),
                // Advanced or closed by a concurrent pass since the scan.
                Err(LeadflowError::InvalidStatus(reason)) => {
                    tracing::debug!(execution_id = %execution.id, %reason, "follow-up step skipped");
                }
                Err(err) => {
                    tracing::warn!(execution_id = %execution.id, error = %err, "follow-up step failed");
                    report.failures.push(RunFailure {
                        execution_id: execution.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if !report.advanced.is_empty() || !report.failures.is_empty() {
            tracing::info!(
                advanced = report.advanced.len(),
                completed = report.completed(),
                failed = report.failures.len(),
                "follow-up run finished"
            );
        }
        report
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn all_executions(&self) -> Vec<FollowupExecution> {
        self.executions.all()
    }
}

/// Message for the execution's current step: the step text or the rendered
/// template, with the contact's variables filled in. `None` when the
/// sequence has no step at `current_step` any more.
fn step_message(
    execution: &FollowupExecution,
    sequence: &FollowupSequence,
    contacts: &ContactStore,
    templates: &TemplateStore,
) -> Result<Option<String>> {
    let Some(step) = sequence.steps.get(execution.current_step) else {
        return Ok(None);
    };
    let contact = contacts.get(&execution.contact_id)?;
    let vars = contact_variables(&contact);
    let message = match (&step.message, &step.template_id) {
        (Some(text), _) => render_body(text, &vars)?,
        (None, Some(template_id)) => templates.get(template_id)?.render(&vars)?,
        (None, None) => {
            return Err(LeadflowError::validation(format!(
                "step {} has no message",
                execution.current_step
            )))
        }
    };
    Ok(Some(message))
}
