//! Remote CRM access: the `EntityStore` seam the reconciliation engine
//! writes through, a HubSpot-shaped HTTP adapter, the contact resolver, and
//! an in-memory store for tests and local development.

pub mod contacts;
pub mod errors;
pub mod hubspot;
pub mod memory;
pub mod store;

pub use contacts::{lead_status, ContactId, ContactResolver, HubSpotContacts};
pub use errors::StoreError;
pub use hubspot::HubSpotStore;
pub use memory::MemoryStore;
pub use store::EntityStore;
