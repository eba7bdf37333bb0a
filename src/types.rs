use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LeadflowError, Result};

/// Current UTC time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Messaging channel a contact, campaign or test runs on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Instagram,
    Facebook,
    Whatsapp,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Instagram,
        Channel::Facebook,
        Channel::Whatsapp,
        Channel::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Instagram => "instagram",
            Channel::Facebook => "facebook",
            Channel::Whatsapp => "whatsapp",
            Channel::Email => "email",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "instagram" | "ig" => Ok(Channel::Instagram),
            "facebook" | "fb" | "messenger" => Ok(Channel::Facebook),
            "whatsapp" => Ok(Channel::Whatsapp),
            "email" => Ok(Channel::Email),
            other => Err(LeadflowError::validation(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How interested a lead is. Ordered `Cold < Warm < Hot`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    Cold,
    Warm,
    Hot,
}

impl InterestLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestLevel::Cold => "cold",
            InterestLevel::Warm => "warm",
            InterestLevel::Hot => "hot",
        }
    }

    /// Warm and hot leads count towards the interest rate.
    pub fn is_interested(&self) -> bool {
        *self >= InterestLevel::Warm
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cold" | "low" => Ok(InterestLevel::Cold),
            "warm" | "medium" => Ok(InterestLevel::Warm),
            "hot" | "high" => Ok(InterestLevel::Hot),
            other => Err(LeadflowError::validation(format!(
                "unknown interest level: {other}"
            ))),
        }
    }
}

impl fmt::Display for InterestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LeadflowError::MissingField(field.to_string()));
    }
    Ok(())
}

/// Trimmed, lowercased, de-duplicated tags in first-seen order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
