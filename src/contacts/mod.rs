pub mod model;
pub mod store;

pub use model::{Contact, ContactInput, ContactStatus, InterestSignal};
pub use store::{ContactFilter, ContactStore, UpsertOutcome};
