pub mod assignment;
pub mod config;
pub mod lifecycle;
pub mod promotion;
pub mod stats;
pub mod store;

pub use config::{
    AbTest, AbTestStatus, ConfidenceSource, NewAbTest, NewVariant, Variant, WizardStep,
    PROMOTION_CONFIDENCE,
};
pub use lifecycle::MetricsIncrement;
pub use promotion::{calculate_lift, can_promote, promote_winner, PromotionOutcome};
pub use stats::{AbTestSummary, TestResults};
pub use store::{AbTestFilter, AbTestStore, TestRepository};
