use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::storage::Record;
use crate::types::{new_id, now_ms, require_non_empty, InterestLevel};

pub const MS_PER_HOUR: i64 = 3_600_000;

/// What starts a sequence for a contact.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SequenceTrigger {
    /// Contacts are enrolled explicitly.
    #[default]
    Manual,
    /// Contacts are enrolled when an interest signal at exactly `level` arrives.
    Interest { level: InterestLevel },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FollowupStep {
    pub delay_hours: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

impl FollowupStep {
    pub fn delay_ms(&self) -> i64 {
        i64::from(self.delay_hours) * MS_PER_HOUR
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FollowupSequence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub trigger: SequenceTrigger,
    pub steps: Vec<FollowupStep>,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FollowupSequence {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.steps.is_empty() {
            return Err(LeadflowError::validation(
                "a follow-up sequence needs at least one step",
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            let has_message = step
                .message
                .as_deref()
                .is_some_and(|m| !m.trim().is_empty());
            let has_template = step
                .template_id
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if has_message == has_template {
                return Err(LeadflowError::validation(format!(
                    "steps[{i}] needs exactly one of message or templateId"
                )));
            }
        }
        Ok(())
    }
}

impl Record for FollowupSequence {
    const KIND: &'static str = "follow-up sequence";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn validate(&self) -> Result<()> {
        FollowupSequence::validate(self)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SequenceInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trigger: SequenceTrigger,
    #[serde(default)]
    pub steps: Vec<FollowupStep>,
    /// Defaults to true.
    #[serde(default)]
    pub active: Option<bool>,
}

impl SequenceInput {
    pub fn into_sequence(self) -> Result<FollowupSequence> {
        let now = now_ms();
        let sequence = FollowupSequence {
            id: new_id(),
            name: self.name.trim().to_string(),
            trigger: self.trigger,
            steps: self.steps,
            active: self.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        sequence.validate()?;
        Ok(sequence)
    }

    pub fn apply_to(self, sequence: &mut FollowupSequence) -> Result<()> {
        sequence.name = self.name.trim().to_string();
        sequence.trigger = self.trigger;
        sequence.steps = self.steps;
        if let Some(active) = self.active {
            sequence.active = active;
        }
        sequence.updated_at = now_ms();
        sequence.validate()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Cancelled,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 3] = [
        ExecutionStatus::Active,
        ExecutionStatus::Completed,
        ExecutionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ExecutionStatus::Active),
            "completed" => Ok(ExecutionStatus::Completed),
            "cancelled" | "canceled" => Ok(ExecutionStatus::Cancelled),
            other => Err(LeadflowError::validation(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

/// One message that went out as part of an execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: usize,
    pub message: String,
    pub sent_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FollowupExecution {
    pub id: String,
    pub sequence_id: String,
    pub contact_id: String,
    pub status: ExecutionStatus,
    pub current_step: usize,
    pub next_run_at: Option<i64>,
    #[serde(default)]
    pub history: Vec<StepRecord>,
    pub started_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl FollowupExecution {
    pub fn is_due(&self, now: i64) -> bool {
        self.status == ExecutionStatus::Active && self.next_run_at.is_some_and(|at| at <= now)
    }
}

impl Record for FollowupExecution {
    const KIND: &'static str = "follow-up execution";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.started_at
    }

    fn validate(&self) -> Result<()> {
        match (self.status, self.next_run_at) {
            (ExecutionStatus::Active, None) => Err(LeadflowError::validation(
                "an active execution needs nextRunAt",
            )),
            (ExecutionStatus::Completed | ExecutionStatus::Cancelled, Some(_)) => Err(
                LeadflowError::validation("a finished execution cannot have nextRunAt"),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(message: Option<&str>, template: Option<&str>) -> FollowupStep {
        FollowupStep {
            delay_hours: 24,
            message: message.map(String::from),
            template_id: template.map(String::from),
        }
    }

    #[test]
    fn sequence_needs_steps() {
        let form = SequenceInput {
            name: "Nurture".into(),
            ..Default::default()
        };
        assert!(matches!(
            form.into_sequence(),
            Err(LeadflowError::Validation(_))
        ));
    }

    #[test]
    fn step_needs_exactly_one_source() {
        for bad in [step(None, None), step(Some("hi"), Some("tpl"))] {
            let form = SequenceInput {
                name: "Nurture".into(),
                steps: vec![bad],
                ..Default::default()
            };
            let err = form.into_sequence().unwrap_err();
            assert!(err.to_string().contains("steps[0]"), "{err}");
        }
    }

    #[test]
    fn sequence_defaults() {
        let seq = SequenceInput {
            name: " Nurture ".into(),
            steps: vec![step(Some("hi"), None)],
            ..Default::default()
        }
        .into_sequence()
        .unwrap();
        assert_eq!(seq.name, "Nurture");
        assert!(seq.active);
        assert_eq!(seq.trigger, SequenceTrigger::Manual);
        assert_eq!(seq.steps[0].delay_ms(), 24 * MS_PER_HOUR);
    }

    #[test]
    fn trigger_serde_shape() {
        let t = SequenceTrigger::Interest {
            level: InterestLevel::Hot,
        };
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json, serde_json::json!({"type": "interest", "level": "hot"}));
        let manual: SequenceTrigger = serde_json::from_str(r#"{"type":"manual"}"#).unwrap();
        assert_eq!(manual, SequenceTrigger::Manual);
    }

    #[test]
    fn execution_status_parse() {
        assert_eq!(ExecutionStatus::parse("canceled").unwrap(), ExecutionStatus::Cancelled);
        assert!(ExecutionStatus::parse("paused").is_err());
    }
}
