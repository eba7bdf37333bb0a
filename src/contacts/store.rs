use std::path::Path;
use std::sync::Mutex;

use super::model::{normalize_handle, Contact, ContactInput, ContactStatus, InterestSignal};
use crate::error::Result;
use crate::storage::JsonStore;
use crate::types::{Channel, InterestLevel};

#[derive(Debug, Default, Clone)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
    pub channel: Option<Channel>,
    pub interest_level: Option<InterestLevel>,
    pub tag: Option<String>,
    /// Case-insensitive substring over name, email and handle.
    pub query: Option<String>,
}

impl ContactFilter {
    fn matches(&self, contact: &Contact) -> bool {
        if self.status.is_some_and(|s| s != contact.status) {
            return false;
        }
        if self.channel.is_some_and(|c| c != contact.channel) {
            return false;
        }
        if self.interest_level.is_some_and(|l| l != contact.interest_level) {
            return false;
        }
        if let Some(ref tag) = self.tag {
            if !contact.has_tag(tag) {
                return false;
            }
        }
        if let Some(ref query) = self.query {
            let needle = query.trim().to_lowercase();
            if !needle.is_empty() {
                let hit = contact.name.to_lowercase().contains(&needle)
                    || contact
                        .email
                        .as_deref()
                        .is_some_and(|e| e.contains(&needle))
                    || contact
                        .handle
                        .as_deref()
                        .is_some_and(|h| h.contains(needle.trim_start_matches('@')));
                if !hit {
                    return false;
                }
            }
        }
        true
    }
}

/// Result of folding an interest signal into the contact list.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub contact: Contact,
    pub created: bool,
}

pub struct ContactStore {
    inner: JsonStore<Contact>,
    /// Held across identity lookup and create, so two signals for a new
    /// identity produce one contact.
    upserts: Mutex<()>,
}

impl ContactStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            inner: JsonStore::open(data_dir, "contacts")?,
            upserts: Mutex::new(()),
        })
    }

    pub fn create(&self, input: ContactInput) -> Result<Contact> {
        let contact = input.into_contact()?;
        let created = self.inner.insert(contact)?;
        tracing::info!(contact_id = %created.id, channel = %created.channel, "contact created");
        Ok(created)
    }

    pub fn get(&self, id: &str) -> Result<Contact> {
        self.inner.get(id)
    }

    pub fn update(&self, id: &str, input: ContactInput) -> Result<Contact> {
        self.inner.update(id, |contact| input.apply_to(contact))
    }

    pub fn delete(&self, id: &str) -> Result<Contact> {
        let removed = self.inner.remove(id)?;
        tracing::info!(contact_id = %id, "contact deleted");
        Ok(removed)
    }

    pub fn list(&self, filter: &ContactFilter) -> Vec<Contact> {
        self.inner.filter(|c| filter.matches(c))
    }

    pub fn all(&self) -> Vec<Contact> {
        self.inner.all()
    }

    /// Looks a contact up by email first, then by channel + handle, then by phone.
    pub fn find_by_identity(
        &self,
        email: Option<&str>,
        channel: Channel,
        handle: Option<&str>,
        phone: Option<&str>,
    ) -> Option<Contact> {
        let email = email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        if let Some(ref email) = email {
            if let Some(found) = self
                .inner
                .filter(|c| c.email.as_deref() == Some(email.as_str()))
                .into_iter()
                .next()
            {
                return Some(found);
            }
        }
        let handle = handle.map(normalize_handle).filter(|h| !h.is_empty());
        if let Some(ref handle) = handle {
            if let Some(found) = self
                .inner
                .filter(|c| c.channel == channel && c.handle.as_deref() == Some(handle.as_str()))
                .into_iter()
                .next()
            {
                return Some(found);
            }
        }
        let phone = phone.map(str::trim).filter(|p| !p.is_empty())?;
        self.inner
            .filter(|c| c.phone.as_deref() == Some(phone))
            .into_iter()
            .next()
    }

    /// Creates or updates the contact an interest signal refers to.
    pub fn upsert_interest(&self, signal: &InterestSignal) -> Result<UpsertOutcome> {
        let _guard = self.upserts.lock().unwrap_or_else(|e| e.into_inner());
        let existing = self.find_by_identity(
            signal.email.as_deref(),
            signal.channel,
            signal.handle.as_deref(),
            signal.phone.as_deref(),
        );
        match existing {
            Some(found) => {
                let contact = self.inner.update(&found.id, |contact| {
                    signal.merge_into(contact);
                    Ok(())
                })?;
                tracing::info!(
                    contact_id = %contact.id,
                    level = %signal.level,
                    "interest recorded for existing contact"
                );
                Ok(UpsertOutcome {
                    contact,
                    created: false,
                })
            }
            None => {
                let contact = self.inner.insert(signal.new_contact()?)?;
                tracing::info!(
                    contact_id = %contact.id,
                    level = %signal.level,
                    "contact created from interest signal"
                );
                Ok(UpsertOutcome {
                    contact,
                    created: true,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
