//! Derived dashboard statistics over store snapshots.

use serde::Serialize;

use crate::abtests::{AbTest, AbTestSummary};
use crate::campaigns::{Campaign, CampaignStatus};
use crate::contacts::{Contact, ContactStatus};
use crate::followups::{ExecutionStatus, FollowupExecution};
use crate::types::{ratio, Channel, InterestLevel};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ContactKpis {
    pub total: usize,
    pub interested: usize,
    pub hot: usize,
    pub converted: usize,
    /// Warm or hot contacts over all contacts, in [0, 1].
    pub interest_rate: f64,
    /// Converted contacts over all contacts, in [0, 1].
    pub conversion_rate: f64,
}

impl ContactKpis {
    pub fn from_contacts(contacts: &[Contact]) -> Self {
        let total = contacts.len();
        let interested = contacts
            .iter()
            .filter(|c| c.interest_level.is_interested())
            .count();
        let converted = contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Converted)
            .count();
        Self {
            total,
            interested,
            hot: contacts
                .iter()
                .filter(|c| c.interest_level == InterestLevel::Hot)
                .count(),
            converted,
            interest_rate: ratio(interested as u64, total as u64),
            conversion_rate: ratio(converted as u64, total as u64),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CampaignKpis {
    pub total: usize,
    pub active: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub sent: u64,
    pub delivered: u64,
    pub clicked: u64,
    pub replied: u64,
    pub converted: u64,
    pub ctr: f64,
    pub reply_rate: f64,
}

impl CampaignKpis {
    pub fn from_campaigns(campaigns: &[Campaign]) -> Self {
        let count = |status: CampaignStatus| campaigns.iter().filter(|c| c.status == status).count();
        let mut kpis = Self {
            total: campaigns.len(),
            active: count(CampaignStatus::Active),
            scheduled: count(CampaignStatus::Scheduled),
            completed: count(CampaignStatus::Completed),
            ..Default::default()
        };
        for c in campaigns {
            kpis.sent += c.metrics.sent;
            kpis.delivered += c.metrics.delivered;
            kpis.clicked += c.metrics.clicked;
            kpis.replied += c.metrics.replied;
            kpis.converted += c.metrics.converted;
        }
        kpis.ctr = ratio(kpis.clicked, kpis.sent);
        kpis.reply_rate = ratio(kpis.replied, kpis.sent);
        kpis
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FollowupKpis {
    pub sequences: usize,
    pub active_executions: usize,
    pub completed_executions: usize,
    pub cancelled_executions: usize,
    pub messages_sent: usize,
}

impl FollowupKpis {
    pub fn from_executions(sequences: usize, executions: &[FollowupExecution]) -> Self {
        let count = |status: ExecutionStatus| executions.iter().filter(|e| e.status == status).count();
        Self {
            sequences,
            active_executions: count(ExecutionStatus::Active),
            completed_executions: count(ExecutionStatus::Completed),
            cancelled_executions: count(ExecutionStatus::Cancelled),
            messages_sent: executions.iter().map(|e| e.history.len()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub contacts: ContactKpis,
    pub campaigns: CampaignKpis,
    pub abtests: AbTestSummary,
    pub followups: FollowupKpis,
}

impl Overview {
    pub fn build(
        contacts: &[Contact],
        campaigns: &[Campaign],
        tests: &[AbTest],
        sequence_count: usize,
        executions: &[FollowupExecution],
    ) -> Self {
        Self {
            contacts: ContactKpis::from_contacts(contacts),
            campaigns: CampaignKpis::from_campaigns(campaigns),
            abtests: AbTestSummary::from_tests(tests),
            followups: FollowupKpis::from_executions(sequence_count, executions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel: Channel,
    pub contacts: usize,
    pub interested: usize,
    pub interest_rate: f64,
    pub campaigns: usize,
    pub sent: u64,
    pub clicked: u64,
    pub replied: u64,
    pub ctr: f64,
    pub reply_rate: f64,
}

/// One row per channel, in `Channel::ALL` order, including empty channels.
pub fn channel_stats(contacts: &[Contact], campaigns: &[Campaign]) -> Vec<ChannelStats> {
    Channel::ALL
        .into_iter()
        .map(|channel| {
            let on_channel: Vec<&Contact> =
                contacts.iter().filter(|c| c.channel == channel).collect();
            let interested = on_channel
                .iter()
                .filter(|c| c.interest_level.is_interested())
                .count();
            let mut row = ChannelStats {
                channel,
                contacts: on_channel.len(),
                interested,
                interest_rate: ratio(interested as u64, on_channel.len() as u64),
                campaigns: 0,
                sent: 0,
                clicked: 0,
                replied: 0,
                ctr: 0.0,
                reply_rate: 0.0,
            };
            for c in campaigns.iter().filter(|c| c.channel == channel) {
                row.campaigns += 1;
                row.sent += c.metrics.sent;
                row.clicked += c.metrics.clicked;
                row.replied += c.metrics.replied;
            }
            row.ctr = ratio(row.clicked, row.sent);
            row.reply_rate = ratio(row.replied, row.sent);
            row
        })
        .collect()
}
