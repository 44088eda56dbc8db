use async_trait::async_trait;
use dealbridge_core::{OpportunityFields, OpportunityId, OpportunityRecord, UserIdentity};

use crate::contacts::ContactId;
use crate::errors::StoreError;

/// Remote opportunity operations. The remote search index is eventually
/// consistent: a record just written may be invisible to either search for
/// a while, which is why callers get two search paths.
///
/// `update` and `associate` are idempotent at the field level; `create` is
/// not and must be guarded by the reconciliation engine.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create(&self, fields: &OpportunityFields) -> Result<OpportunityId, StoreError>;

    async fn update(
        &self,
        id: &OpportunityId,
        fields: &OpportunityFields,
    ) -> Result<(), StoreError>;

    /// Open (non-terminal) records tagged with the given user identity.
    async fn search_by_identity(
        &self,
        identity: &UserIdentity,
    ) -> Result<Vec<OpportunityRecord>, StoreError>;

    /// Open records matching an exact display name. Fallback for when the
    /// identity property has not been indexed yet.
    async fn search_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<OpportunityRecord>, StoreError>;

    async fn associate(
        &self,
        id: &OpportunityId,
        contact_id: &ContactId,
    ) -> Result<(), StoreError>;
}
