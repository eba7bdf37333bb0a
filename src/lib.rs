//! Leadflow: the core of a marketing CRM.
//!
//! Contacts, campaigns, message templates, A/B tests with winner promotion,
//! follow-up sequences, an activity feed and derived dashboard statistics.
//! Every entity lives in a JSON-backed store under one data directory; the
//! HTTP surface is in the `leadflow-http` crate.

pub mod abtests;
pub mod activity;
pub mod campaigns;
pub mod contacts;
pub mod dashboard;
pub mod error;
pub mod followups;
pub mod storage;
pub mod templates;
pub mod types;
pub mod webhooks;

pub use error::{LeadflowError, Result};
pub use types::{Channel, InterestLevel};
