//! Inbound webhook payloads.
//!
//! Bodies are parsed from raw bytes into loose structs first, then checked
//! field by field so a missing field surfaces as `MissingField("<field>")`
//! rather than a generic JSON error.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::campaigns::CampaignInput;
use crate::contacts::InterestSignal;
use crate::error::{LeadflowError, Result};
use crate::types::{now_ms, Channel, InterestLevel};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-leadflow-signature";
const SIGNATURE_PREFIX: &str = "sha256=";

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Checks a `sha256=<hex>` signature header in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<()> {
    let provided = header
        .and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX))
        .ok_or(LeadflowError::InvalidSignature)?;
    let expected = hex::decode(provided).map_err(|_| LeadflowError::InvalidSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| LeadflowError::InvalidSignature)
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LeadflowError::MissingField(field.to_string()))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(LeadflowError::Json("empty request body".to_string()));
    }
    serde_json::from_slice(body).map_err(LeadflowError::from)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawCampaignWebhook {
    #[serde(alias = "campaign_name")]
    campaign_name: Option<String>,
    channel: Option<String>,
    message: Option<String>,
    #[serde(default, alias = "audience_tags")]
    audience_tags: Option<Vec<String>>,
    #[serde(alias = "scheduled_at")]
    scheduled_at: Option<i64>,
    #[serde(alias = "template_id")]
    template_id: Option<String>,
}

/// "Create this campaign" notification from an automation tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignWebhook {
    pub campaign_name: String,
    pub channel: Channel,
    pub message: String,
    pub audience_tags: Vec<String>,
    pub scheduled_at: Option<i64>,
    pub template_id: Option<String>,
}

impl CampaignWebhook {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawCampaignWebhook = parse_body(body)?;
        let campaign_name = required("campaignName", raw.campaign_name)?;
        let channel = Channel::parse(&required("channel", raw.channel)?)?;
        let message = required("message", raw.message)?;
        Ok(Self {
            campaign_name,
            channel,
            message,
            audience_tags: raw.audience_tags.unwrap_or_default(),
            scheduled_at: raw.scheduled_at,
            template_id: optional(raw.template_id),
        })
    }

    pub fn into_campaign_input(self) -> CampaignInput {
        CampaignInput {
            name: self.campaign_name,
            channel: Some(self.channel),
            message: self.message,
            template_id: self.template_id,
            audience_tags: self.audience_tags,
            scheduled_at: self.scheduled_at,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawInterestWebhook {
    channel: Option<String>,
    #[serde(alias = "interest_level")]
    interest_level: Option<String>,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    handle: Option<String>,
    message: Option<String>,
    #[serde(alias = "occurred_at")]
    occurred_at: Option<i64>,
}

/// "This lead showed interest" notification from a messaging channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InterestWebhook {
    pub channel: Channel,
    pub interest_level: InterestLevel,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
    pub message: Option<String>,
    pub occurred_at: Option<i64>,
}

impl InterestWebhook {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawInterestWebhook = parse_body(body)?;
        let channel = Channel::parse(&required("channel", raw.channel)?)?;
        let interest_level = InterestLevel::parse(&required("interestLevel", raw.interest_level)?)?;
        let hook = Self {
            channel,
            interest_level,
            name: optional(raw.name),
            email: optional(raw.email),
            phone: optional(raw.phone),
            handle: optional(raw.handle),
            message: optional(raw.message),
            occurred_at: raw.occurred_at,
        };
        if hook.email.is_none() && hook.phone.is_none() && hook.handle.is_none() {
            return Err(LeadflowError::MissingField(
                "email, phone or handle".to_string(),
            ));
        }
        Ok(hook)
    }

    pub fn into_signal(self) -> InterestSignal {
        InterestSignal {
            channel: self.channel,
            level: self.interest_level,
            name: self.name,
            email: self.email,
            phone: self.phone,
            handle: self.handle,
            message: self.message,
            at: self.occurred_at.unwrap_or_else(now_ms),
        }
    }
}
