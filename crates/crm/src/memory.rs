//! In-memory [`EntityStore`] used by engine and router tests. Mirrors the
//! remote store's observable behavior, including the option to hide fresh
//! records from identity search the way a lagging index does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dealbridge_core::{OpportunityFields, OpportunityId, OpportunityRecord, UserIdentity};

use crate::contacts::ContactId;
use crate::errors::StoreError;
use crate::store::EntityStore;

#[derive(Default)]
struct Inner {
    deals: HashMap<String, StoredDeal>,
    associations: Vec<(OpportunityId, ContactId)>,
    next_id: u64,
    identity_index_visible: bool,
    fail_updates: bool,
    fail_creates: bool,
    fail_searches: bool,
}

#[derive(Clone)]
struct StoredDeal {
    identity: UserIdentity,
    record: OpportunityRecord,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let inner = Inner { identity_index_visible: true, next_id: 1, ..Inner::default() };
        Self { inner: Mutex::new(inner) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// When false, `search_by_identity` returns nothing even for records
    /// that exist. Display-name search stays accurate.
    pub fn set_identity_index_visible(&self, visible: bool) {
        self.lock().identity_index_visible = visible;
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.lock().fail_updates = fail;
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.lock().fail_creates = fail;
    }

    pub fn set_fail_searches(&self, fail: bool) {
        self.lock().fail_searches = fail;
    }

    pub fn deal(&self, id: &OpportunityId) -> Option<OpportunityRecord> {
        self.lock().deals.get(&id.0).map(|deal| deal.record.clone())
    }

    /// All non-terminal records for an identity, ignoring index visibility.
    pub fn open_deals_for(&self, identity: &UserIdentity) -> Vec<OpportunityRecord> {
        self.lock()
            .deals
            .values()
            .filter(|deal| deal.identity == *identity && !deal.record.stage.is_terminal())
            .map(|deal| deal.record.clone())
            .collect()
    }

    pub fn total_deals(&self) -> usize {
        self.lock().deals.len()
    }

    pub fn associations(&self) -> Vec<(OpportunityId, ContactId)> {
        self.lock().associations.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create(&self, fields: &OpportunityFields) -> Result<OpportunityId, StoreError> {
        let mut inner = self.lock();
        if inner.fail_creates {
            return Err(StoreError::Transient("simulated create failure".to_string()));
        }

        let id = OpportunityId(format!("deal-{}", inner.next_id));
        inner.next_id += 1;
        inner.deals.insert(
            id.0.clone(),
            StoredDeal {
                identity: fields.identity.clone(),
                record: OpportunityRecord {
                    id: id.clone(),
                    display_name: fields.display_name.clone(),
                    stage: fields.stage,
                    subject: fields.subject.clone(),
                    description: Some(fields.description.clone()),
                    last_modified: Utc::now(),
                },
            },
        );
        Ok(id)
    }

    async fn update(
        &self,
        id: &OpportunityId,
        fields: &OpportunityFields,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_updates {
            return Err(StoreError::Transient("simulated update failure".to_string()));
        }

        let deal = inner
            .deals
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::Fatal(format!("no such record: {}", id.0)))?;
        deal.record.display_name = fields.display_name.clone();
        deal.record.stage = fields.stage;
        deal.record.subject = fields.subject.clone();
        deal.record.description = Some(fields.description.clone());
        deal.record.last_modified = Utc::now();
        Ok(())
    }

    async fn search_by_identity(
        &self,
        identity: &UserIdentity,
    ) -> Result<Vec<OpportunityRecord>, StoreError> {
        let inner = self.lock();
        if inner.fail_searches {
            return Err(StoreError::Transient("simulated search failure".to_string()));
        }
        if !inner.identity_index_visible {
            return Ok(Vec::new());
        }

        Ok(inner
            .deals
            .values()
            .filter(|deal| deal.identity == *identity && !deal.record.stage.is_terminal())
            .map(|deal| deal.record.clone())
            .collect())
    }

    async fn search_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<OpportunityRecord>, StoreError> {
        let inner = self.lock();
        if inner.fail_searches {
            return Err(StoreError::Transient("simulated search failure".to_string()));
        }

        Ok(inner
            .deals
            .values()
            .filter(|deal| {
                deal.record.display_name == display_name && !deal.record.stage.is_terminal()
            })
            .map(|deal| deal.record.clone())
            .collect())
    }

    async fn associate(
        &self,
        id: &OpportunityId,
        contact: &ContactId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.deals.contains_key(&id.0) {
            return Err(StoreError::Fatal(format!("no such record: {}", id.0)));
        }
        inner.associations.push((id.clone(), contact.clone()));
        Ok(())
    }
}
