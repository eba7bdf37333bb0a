//! Bounded in-memory activity feed. Not persisted; a restart starts empty.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::types::{new_id, now_ms};

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ContactCreated,
    ContactInterest,
    CampaignCreated,
    CampaignStatusChanged,
    AbTestCreated,
    AbTestStatusChanged,
    AbTestPromoted,
    FollowupEnrolled,
    FollowupStepSent,
    FollowupCompleted,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub kind: ActivityKind,
    pub subject_id: String,
    pub summary: String,
    pub at: i64,
}

pub struct ActivityLog {
    events: RwLock<VecDeque<ActivityEvent>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, kind: ActivityKind, subject_id: &str, summary: impl Into<String>) {
        let event = ActivityEvent {
            id: new_id(),
            kind,
            subject_id: subject_id.to_string(),
            summary: summary.into(),
            at: now_ms(),
        };
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_back();
        }
        events.push_front(event);
    }

    /// Up to `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
