pub mod engine;
pub mod model;
pub mod service;

pub use model::{
    ExecutionStatus, FollowupExecution, FollowupSequence, FollowupStep, SequenceInput,
    SequenceTrigger, StepRecord,
};
pub use service::{ExecutionFilter, Followups, RunFailure, RunReport};
