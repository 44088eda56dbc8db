//! The reconciliation loop. One call per inbound message: find the user's
//! open deal (cache, then identity search, then display-name search), apply
//! the stage policy, and only create when every lookup came back empty.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dealbridge_core::config::CacheConfig;
use dealbridge_core::{
    initial_stage, resolve_stage, DealStage, Intent, OpportunityFields, OpportunityId,
    OpportunityRecord, UserIdentity,
};
use dealbridge_crm::{ContactId, EntityStore, StoreError};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CachedDeal, RecencyCache};

const GENERAL_SUBJECT: &str = "Consulta general";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    Created,
    Updated,
    Closed,
    NoOp,
    Failed,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Closed => "closed",
            Self::NoOp => "no_op",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReconcileOutcome {
    pub record_id: Option<OpportunityId>,
    pub stage: DealStage,
    pub action: ReconcileAction,
    pub display_name: Option<String>,
    pub error: Option<String>,
}

impl ReconcileOutcome {
    fn failed(stage: DealStage, error: impl Into<String>) -> Self {
        Self {
            record_id: None,
            stage,
            action: ReconcileAction::Failed,
            display_name: None,
            error: Some(error.into()),
        }
    }
}

pub struct ReconcileRequest<'a> {
    pub identity: &'a UserIdentity,
    pub intent: &'a Intent,
    pub contact_id: Option<&'a ContactId>,
    pub amount: Option<Decimal>,
    pub description: String,
}

/// What the engine knows about the deal it is about to update, regardless
/// of whether that knowledge came from the cache or a remote search.
struct CurrentDeal {
    id: OpportunityId,
    stage: DealStage,
    subject: Option<String>,
}

impl From<CachedDeal> for CurrentDeal {
    fn from(cached: CachedDeal) -> Self {
        Self { id: cached.id, stage: cached.stage, subject: cached.subject }
    }
}

impl From<OpportunityRecord> for CurrentDeal {
    fn from(record: OpportunityRecord) -> Self {
        Self { id: record.id, stage: record.stage, subject: record.subject }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn EntityStore>,
    cache: RecencyCache,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    lock_prune_threshold: usize,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn EntityStore>, cache_config: &CacheConfig) -> Self {
        Self {
            store,
            cache: RecencyCache::new(cache_config),
            locks: Mutex::new(HashMap::new()),
            lock_prune_threshold: cache_config.capacity.max(2),
        }
    }

    pub async fn reconcile(&self, request: ReconcileRequest<'_>) -> ReconcileOutcome {
        let fallback_stage = initial_stage(request.intent.category);
        let Some(contact_id) = request.contact_id else {
            warn!(
                event_name = "engine.reconcile.no_contact",
                identity = %request.identity,
                "reconcile refused without a linked contact"
            );
            return ReconcileOutcome::failed(fallback_stage, "no linked contact");
        };

        // Serialize per identity so two concurrent messages cannot both
        // miss every lookup and double-create.
        let identity_lock = self.lock_for(request.identity);
        let _guard = identity_lock.lock().await;

        if let Some(cached) = self.cache.get(request.identity) {
            if cached.stage.is_terminal() {
                self.cache.invalidate(request.identity);
            } else {
                match self.apply_update(&request, cached.into()).await {
                    Ok(outcome) => return outcome,
                    Err(error) => {
                        // Stale cache entry or a remote hiccup; the remote
                        // searches below re-establish ground truth.
                        warn!(
                            event_name = "engine.reconcile.cached_update_failed",
                            identity = %request.identity,
                            error = %error,
                            transient = error.is_transient(),
                            "write-through update failed, falling back to search"
                        );
                    }
                }
            }
        }

        if let Some(found) = self.find_open_deal(&request).await {
            return match self.apply_update(&request, found.into()).await {
                Ok(outcome) => outcome,
                Err(error) => ReconcileOutcome::failed(fallback_stage, error.to_string()),
            };
        }

        if request.intent.is_cancel() {
            info!(
                event_name = "engine.reconcile.cancel_without_record",
                identity = %request.identity,
                "nothing open to close"
            );
            return ReconcileOutcome {
                record_id: None,
                stage: DealStage::Lost,
                action: ReconcileAction::NoOp,
                display_name: None,
                error: None,
            };
        }

        self.create_deal(&request, contact_id).await
    }

    async fn apply_update(
        &self,
        request: &ReconcileRequest<'_>,
        current: CurrentDeal,
    ) -> Result<ReconcileOutcome, StoreError> {
        let resolution = resolve_stage(current.stage, request.intent.category);
        let subject = request
            .intent
            .subject
            .clone()
            .or_else(|| current.subject.clone());
        let display_name = display_name_for(subject.as_deref(), request.identity);

        let fields = OpportunityFields {
            identity: request.identity.clone(),
            display_name: display_name.clone(),
            stage: resolution.next,
            subject: subject.clone(),
            description: request.description.clone(),
            amount: request.amount,
        };
        self.store.update(&current.id, &fields).await?;

        if resolution.is_terminal {
            self.cache.invalidate(request.identity);
        } else {
            self.cache.put(
                request.identity,
                CachedDeal {
                    id: current.id.clone(),
                    stage: resolution.next,
                    subject,
                    display_name: display_name.clone(),
                },
            );
        }

        let action = if resolution.is_terminal {
            ReconcileAction::Closed
        } else {
            ReconcileAction::Updated
        };
        info!(
            event_name = "engine.reconcile.updated",
            identity = %request.identity,
            record_id = %current.id,
            stage = resolution.next.as_str(),
            action = action.as_str(),
            "open deal reconciled"
        );

        Ok(ReconcileOutcome {
            record_id: Some(current.id),
            stage: resolution.next,
            action,
            display_name: Some(display_name),
            error: None,
        })
    }

    /// Identity search first, display-name search as the index-lag fallback.
    /// Search errors are absorbed as empty so one flaky search cannot fail a
    /// message that a create or the next retry would handle.
    async fn find_open_deal(&self, request: &ReconcileRequest<'_>) -> Option<OpportunityRecord> {
        let by_identity = match self.store.search_by_identity(request.identity).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "engine.reconcile.identity_search_failed",
                    identity = %request.identity,
                    error = %error,
                    "identity search failed, treating as empty"
                );
                Vec::new()
            }
        };
        if let Some(record) = most_recent(by_identity) {
            return Some(record);
        }

        let name = display_name_for(request.intent.subject.as_deref(), request.identity);
        let by_name = match self.store.search_by_display_name(&name).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "engine.reconcile.name_search_failed",
                    identity = %request.identity,
                    display_name = %name,
                    error = %error,
                    "display-name search failed, treating as empty"
                );
                Vec::new()
            }
        };
        most_recent(by_name)
    }

    async fn create_deal(
        &self,
        request: &ReconcileRequest<'_>,
        contact_id: &ContactId,
    ) -> ReconcileOutcome {
        let stage = initial_stage(request.intent.category);
        let subject = request.intent.subject.clone();
        let display_name = display_name_for(subject.as_deref(), request.identity);

        let fields = OpportunityFields {
            identity: request.identity.clone(),
            display_name: display_name.clone(),
            stage,
            subject: subject.clone(),
            description: request.description.clone(),
            amount: request.amount,
        };
        let id = match self.store.create(&fields).await {
            Ok(id) => id,
            Err(error) => {
                warn!(
                    event_name = "engine.reconcile.create_failed",
                    identity = %request.identity,
                    error = %error,
                    transient = error.is_transient(),
                    "deal creation failed"
                );
                return ReconcileOutcome::failed(stage, error.to_string());
            }
        };

        if let Err(error) = self.store.associate(&id, contact_id).await {
            // The deal exists and is findable by identity either way.
            warn!(
                event_name = "engine.reconcile.associate_failed",
                identity = %request.identity,
                record_id = %id,
                error = %error,
                "contact association failed"
            );
        }

        self.cache.put(
            request.identity,
            CachedDeal { id: id.clone(), stage, subject, display_name: display_name.clone() },
        );
        info!(
            event_name = "engine.reconcile.created",
            identity = %request.identity,
            record_id = %id,
            stage = stage.as_str(),
            "deal created"
        );

        ReconcileOutcome {
            record_id: Some(id),
            stage,
            action: ReconcileAction::Created,
            display_name: Some(display_name),
            error: None,
        }
    }

    fn lock_for(&self, identity: &UserIdentity) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if locks.len() > self.lock_prune_threshold {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(identity.0.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

fn display_name_for(subject: Option<&str>, identity: &UserIdentity) -> String {
    format!("{} [{}]", subject.unwrap_or(GENERAL_SUBJECT), identity)
}

fn most_recent(records: Vec<OpportunityRecord>) -> Option<OpportunityRecord> {
    records.into_iter().max_by_key(|record| record.last_modified)
}

#[cfg(test)]
mod tests {
    use dealbridge_core::UserIdentity;

    use super::display_name_for;

    #[test]
    fn display_name_embeds_the_identity() {
        let identity = UserIdentity::new("psid-42");
        assert_eq!(display_name_for(Some("Botox"), &identity), "Botox [psid-42]");
        assert_eq!(display_name_for(None, &identity), "Consulta general [psid-42]");
    }
}
