use std::path::Path;

use super::model::{Campaign, CampaignInput, CampaignMetrics, CampaignStatus};
use crate::error::{LeadflowError, Result};
use crate::storage::JsonStore;
use crate::types::{new_id, now_ms, Channel};

#[derive(Debug, Default, Clone)]
pub struct CampaignFilter {
    pub status: Option<CampaignStatus>,
    pub channel: Option<Channel>,
}

impl CampaignFilter {
    fn matches(&self, campaign: &Campaign) -> bool {
        self.status.map_or(true, |s| s == campaign.status)
            && self.channel.map_or(true, |c| c == campaign.channel)
    }
}

pub struct CampaignStore {
    inner: JsonStore<Campaign>,
}

fn status_error(campaign: &Campaign, action: &str) -> LeadflowError {
    LeadflowError::InvalidStatus(format!(
        "cannot {action} campaign {} while it is {}",
        campaign.id,
        campaign.status.as_str()
    ))
}

impl CampaignStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            inner: JsonStore::open(data_dir, "campaigns")?,
        })
    }

    pub fn create(&self, input: CampaignInput) -> Result<Campaign> {
        let campaign = self.inner.insert(input.into_campaign()?)?;
        tracing::info!(
            campaign_id = %campaign.id,
            status = campaign.status.as_str(),
            "campaign created"
        );
        Ok(campaign)
    }

    pub fn get(&self, id: &str) -> Result<Campaign> {
        self.inner.get(id)
    }

    pub fn update(&self, id: &str, input: CampaignInput) -> Result<Campaign> {
        self.inner.update(id, |campaign| {
            if campaign.status == CampaignStatus::Completed {
                return Err(status_error(campaign, "update"));
            }
            input.apply_to(campaign)
        })
    }

    pub fn delete(&self, id: &str) -> Result<Campaign> {
        let removed = self.inner.remove_if(id, |campaign| {
            if campaign.status == CampaignStatus::Active {
                return Err(status_error(campaign, "delete"));
            }
            Ok(())
        })?;
        tracing::info!(campaign_id = %id, "campaign deleted");
        Ok(removed)
    }

    pub fn duplicate(&self, id: &str) -> Result<Campaign> {
        let source = self.inner.get(id)?;
        let now = now_ms();
        let copy = Campaign {
            id: new_id(),
            name: format!("{} (copy)", source.name),
            status: CampaignStatus::Draft,
            scheduled_at: None,
            metrics: CampaignMetrics::default(),
            created_at: now,
            updated_at: now,
            launched_at: None,
            completed_at: None,
            ..source
        };
        self.inner.insert(copy)
    }

    pub fn list(&self, filter: &CampaignFilter) -> Vec<Campaign> {
        self.inner.filter(|c| filter.matches(c))
    }

    pub fn all(&self) -> Vec<Campaign> {
        self.inner.all()
    }

    fn transition(
        &self,
        id: &str,
        action: &str,
        allowed_from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Campaign> {
        let campaign = self.inner.update(id, |campaign| {
            if !allowed_from.contains(&campaign.status) {
                return Err(status_error(campaign, action));
            }
            let now = now_ms();
            campaign.status = to;
            campaign.updated_at = now;
            match to {
                CampaignStatus::Active => {
                    campaign.launched_at.get_or_insert(now);
                }
                CampaignStatus::Completed => campaign.completed_at = Some(now),
                _ => {}
            }
            Ok(())
        })?;
        tracing::info!(campaign_id = %id, status = to.as_str(), "campaign {}", action);
        Ok(campaign)
    }

    pub fn launch(&self, id: &str) -> Result<Campaign> {
        self.transition(
            id,
            "launch",
            &[CampaignStatus::Draft, CampaignStatus::Scheduled],
            CampaignStatus::Active,
        )
    }

    pub fn pause(&self, id: &str) -> Result<Campaign> {
        self.transition(id, "pause", &[CampaignStatus::Active], CampaignStatus::Paused)
    }

    pub fn resume(&self, id: &str) -> Result<Campaign> {
        self.transition(id, "resume", &[CampaignStatus::Paused], CampaignStatus::Active)
    }

    pub fn complete(&self, id: &str) -> Result<Campaign> {
        self.transition(
            id,
            "complete",
            &[CampaignStatus::Active, CampaignStatus::Paused],
            CampaignStatus::Completed,
        )
    }

    /// Adds delivery counters to an active campaign.
    pub fn record_metrics(&self, id: &str, increment: &CampaignMetrics) -> Result<Campaign> {
        self.inner.update(id, |campaign| {
            if campaign.status != CampaignStatus::Active {
                return Err(status_error(campaign, "record metrics for"));
            }
            let next = campaign.metrics.saturating_add(increment);
            next.check()?;
            campaign.metrics = next;
            campaign.updated_at = now_ms();
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn input(name: &str, channel: Channel) -> CampaignInput {
        CampaignInput {
            name: name.to_string(),
            channel: Some(channel),
            message: "Hi {{first_name}}, our sale starts now".to_string(),
            ..Default::default()
        }
    }

    fn store() -> (TempDir, CampaignStore) {
        let tmp = TempDir::new().unwrap();
        let store = CampaignStore::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn launch_pause_resume_complete() {
        let (_tmp, store) = store();
        let c = store.create(input("Launch", Channel::Instagram)).unwrap();
        assert!(store.pause(&c.id).is_err());

        let active = store.launch(&c.id).unwrap();
        assert_eq!(active.status, CampaignStatus::Active);
        let launched_at = active.launched_at.unwrap();

        assert_eq!(store.pause(&c.id).unwrap().status, CampaignStatus::Paused);
        let resumed = store.resume(&c.id).unwrap();
        assert_eq!(resumed.launched_at, Some(launched_at));

        let done = store.complete(&c.id).unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(matches!(
            store.launch(&c.id),
            Err(LeadflowError::InvalidStatus(_))
        ));
    }

    #[test]
    fn scheduled_campaign_can_launch() {
        let (_tmp, store) = store();
        let mut form = input("Later", Channel::Email);
        form.scheduled_at = Some(1_900_000_000_000);
        let c = store.create(form).unwrap();
        assert_eq!(c.status, CampaignStatus::Scheduled);
        assert_eq!(store.launch(&c.id).unwrap().status, CampaignStatus::Active);
    }

    #[test]
    fn completed_campaign_cannot_be_updated() {
        let (_tmp, store) = store();
        let c = store.create(input("Done", Channel::Email)).unwrap();
        store.launch(&c.id).unwrap();
        store.complete(&c.id).unwrap();
        assert!(matches!(
            store.update(&c.id, input("Renamed", Channel::Email)),
            Err(LeadflowError::InvalidStatus(_))
        ));
    }

    #[test]
    fn update_keeps_active_status() {
        let (_tmp, store) = store();
        let c = store.create(input("Live", Channel::Email)).unwrap();
        store.launch(&c.id).unwrap();
        let updated = store.update(&c.id, input("Live v2", Channel::Email)).unwrap();
        assert_eq!(updated.status, CampaignStatus::Active);
        assert_eq!(updated.name, "Live v2");
    }

    #[test]
    fn active_campaign_cannot_be_deleted() {
        let (_tmp, store) = store();
        let c = store.create(input("Live", Channel::Facebook)).unwrap();
        store.launch(&c.id).unwrap();
        assert!(store.delete(&c.id).is_err());
        store.pause(&c.id).unwrap();
        store.delete(&c.id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn record_metrics_only_when_active() {
        let (_tmp, store) = store();
        let c = store.create(input("Live", Channel::Instagram)).unwrap();
        let inc = CampaignMetrics {
            sent: 100,
            delivered: 95,
            clicked: 20,
            replied: 10,
            converted: 3,
        };
        assert!(matches!(
            store.record_metrics(&c.id, &inc),
            Err(LeadflowError::InvalidStatus(_))
        ));
        store.launch(&c.id).unwrap();
        store.record_metrics(&c.id, &inc).unwrap();
        let updated = store.record_metrics(&c.id, &inc).unwrap();
        assert_eq!(updated.metrics.sent, 200);
        assert_eq!(updated.metrics.converted, 6);

        let bad = CampaignMetrics {
            clicked: 500,
            ..Default::default()
        };
        assert!(matches!(
            store.record_metrics(&c.id, &bad),
            Err(LeadflowError::Validation(_))
        ));
        assert_eq!(store.get(&c.id).unwrap().metrics.sent, 200);
    }

    #[test]
    fn duplicate_is_fresh_draft() {
        let (_tmp, store) = store();
        let c = store.create(input("Original", Channel::Whatsapp)).unwrap();
        store.launch(&c.id).unwrap();
        store
            .record_metrics(
                &c.id,
                &CampaignMetrics {
                    sent: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        let copy = store.duplicate(&c.id).unwrap();
        assert_eq!(copy.name, "Original (copy)");
        assert_eq!(copy.status, CampaignStatus::Draft);
        assert_eq!(copy.metrics, CampaignMetrics::default());
        assert_eq!(copy.message, c.message);
        assert!(copy.launched_at.is_none());
    }

    #[test]
    fn list_filters_by_status_and_channel() {
        let (_tmp, store) = store();
        let a = store.create(input("A", Channel::Instagram)).unwrap();
        store.create(input("B", Channel::Instagram)).unwrap();
        store.create(input("C", Channel::Email)).unwrap();
        store.launch(&a.id).unwrap();

        let active = store.list(&CampaignFilter {
            status: Some(CampaignStatus::Active),
            ..Default::default()
        });
        assert_eq!(active.len(), 1);
        let ig = store.list(&CampaignFilter {
            channel: Some(Channel::Instagram),
            ..Default::default()
        });
        assert_eq!(ig.len(), 2);
    }
}
