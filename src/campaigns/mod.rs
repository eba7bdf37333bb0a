pub mod model;
pub mod store;

pub use model::{Campaign, CampaignInput, CampaignMetrics, CampaignStatus};
pub use store::{CampaignFilter, CampaignStore};
