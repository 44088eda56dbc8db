pub mod config;
pub mod domain;
pub mod stage;

pub use domain::identity::UserIdentity;
pub use domain::intent::{Intent, IntentCategory};
pub use domain::opportunity::{DealStage, OpportunityFields, OpportunityId, OpportunityRecord};
pub use stage::{initial_stage, resolve_stage, StageResolution};
