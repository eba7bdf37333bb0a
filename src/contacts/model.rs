use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::storage::Record;
use crate::types::{new_id, normalize_tags, now_ms, require_non_empty, Channel, InterestLevel};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Lowercases and strips a leading `@` so `@Shop` and `shop` match.
pub fn normalize_handle(value: &str) -> String {
    value.trim().trim_start_matches('@').to_lowercase()
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 5] = [
        ContactStatus::New,
        ContactStatus::Contacted,
        ContactStatus::Qualified,
        ContactStatus::Converted,
        ContactStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Contacted => "contacted",
            ContactStatus::Qualified => "qualified",
            ContactStatus::Converted => "converted",
            ContactStatus::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(ContactStatus::New),
            "contacted" => Ok(ContactStatus::Contacted),
            "qualified" => Ok(ContactStatus::Qualified),
            "converted" => Ok(ContactStatus::Converted),
            "lost" => Ok(ContactStatus::Lost),
            other => Err(LeadflowError::validation(format!(
                "unknown contact status: {other}"
            ))),
        }
    }

    /// Converted and lost contacts are closed; interest signals leave them alone.
    pub fn is_closed(&self) -> bool {
        matches!(self, ContactStatus::Converted | ContactStatus::Lost)
    }

    fn pipeline_rank(&self) -> u8 {
        match self {
            ContactStatus::New => 0,
            ContactStatus::Contacted => 1,
            ContactStatus::Qualified => 2,
            ContactStatus::Converted | ContactStatus::Lost => 3,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    pub channel: Channel,
    pub interest_level: InterestLevel,
    #[serde(default)]
    pub status: ContactStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub last_interaction_at: Option<i64>,
}

impl Contact {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.email.is_none() && self.phone.is_none() && self.handle.is_none() {
            return Err(LeadflowError::validation(
                "a contact needs at least one of email, phone or handle",
            ));
        }
        if let Some(ref email) = self.email {
            if !is_valid_email(email) {
                return Err(LeadflowError::validation(format!(
                    "invalid email address: {email}"
                )));
            }
        }
        Ok(())
    }
}

impl Record for Contact {
    const KIND: &'static str = "contact";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn validate(&self) -> Result<()> {
        Contact::validate(self)
    }
}

/// Create/replace payload for a contact.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub interest_level: Option<InterestLevel>,
    #[serde(default)]
    pub status: Option<ContactStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl ContactInput {
    pub fn into_contact(self) -> Result<Contact> {
        let now = now_ms();
        let mut contact = Contact {
            id: new_id(),
            name: String::new(),
            email: None,
            phone: None,
            handle: None,
            channel: Channel::Instagram,
            interest_level: InterestLevel::Cold,
            status: ContactStatus::New,
            tags: Vec::new(),
            notes: None,
            source: None,
            created_at: now,
            updated_at: now,
            last_interaction_at: None,
        };
        self.apply_to(&mut contact)?;
        Ok(contact)
    }

    /// Overwrites the editable fields of `contact`. Identity and timestamps stay.
    pub fn apply_to(self, contact: &mut Contact) -> Result<()> {
        let channel = self
            .channel
            .ok_or_else(|| LeadflowError::MissingField("channel".to_string()))?;
        contact.name = self.name.trim().to_string();
        contact.email = clean(self.email).map(|e| e.to_lowercase());
        contact.phone = clean(self.phone);
        contact.handle = clean(self.handle).map(|h| normalize_handle(&h));
        contact.channel = channel;
        contact.interest_level = self.interest_level.unwrap_or(contact.interest_level);
        contact.status = self.status.unwrap_or(contact.status);
        contact.tags = normalize_tags(self.tags);
        contact.notes = clean(self.notes);
        contact.source = clean(self.source);
        contact.updated_at = now_ms();
        contact.validate()
    }
}

/// An inbound "this lead showed interest" signal, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct InterestSignal {
    pub channel: Channel,
    pub level: InterestLevel,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
    pub message: Option<String>,
    pub at: i64,
}

impl InterestSignal {
    fn display_name(&self) -> Option<String> {
        clean(self.name.clone())
            .or_else(|| clean(self.handle.clone()).map(|h| normalize_handle(&h)))
            .or_else(|| clean(self.email.clone()))
            .or_else(|| clean(self.phone.clone()))
    }

    pub(crate) fn new_contact(&self) -> Result<Contact> {
        let name = self.display_name().ok_or_else(|| {
            LeadflowError::MissingField("email, phone or handle".to_string())
        })?;
        let now = now_ms();
        let mut contact = Contact {
            id: new_id(),
            name,
            email: None,
            phone: None,
            handle: None,
            channel: self.channel,
            interest_level: self.level,
            status: ContactStatus::New,
            tags: Vec::new(),
            notes: None,
            source: Some(format!("{} webhook", self.channel)),
            created_at: now,
            updated_at: now,
            last_interaction_at: None,
        };
        self.merge_into(&mut contact);
        contact.validate()?;
        Ok(contact)
    }

    /// Folds the signal into an existing contact. Missing identity fields are
    /// filled in, never overwritten; the status only moves forward.
    pub(crate) fn merge_into(&self, contact: &mut Contact) {
        if contact.email.is_none() {
            contact.email = clean(self.email.clone()).map(|e| e.to_lowercase());
        }
        if contact.phone.is_none() {
            contact.phone = clean(self.phone.clone());
        }
        if contact.handle.is_none() {
            contact.handle = clean(self.handle.clone()).map(|h| normalize_handle(&h));
        }
        contact.interest_level = self.level;
        if self.level.is_interested()
            && !contact.status.is_closed()
            && contact.status.pipeline_rank() < ContactStatus::Qualified.pipeline_rank()
        {
            contact.status = ContactStatus::Qualified;
        }
        if let Some(message) = clean(self.message.clone()) {
            let line = format!("[{}] {}", self.channel, message);
            contact.notes = Some(match contact.notes.take() {
                Some(existing) => format!("{existing}\n{line}"),
                None => line,
            });
        }
        contact.last_interaction_at = Some(
            contact
                .last_interaction_at
                .map_or(self.at, |prev| prev.max(self.at)),
        );
        contact.updated_at = now_ms();
    }
}
