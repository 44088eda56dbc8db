//! Per-identity recency cache. A hit lets the engine update a deal it just
//! touched without waiting for the remote search index to catch up; the TTL
//! is sized to outlive worst-case index propagation. Eviction is only a
//! memory bound, never a correctness mechanism.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dealbridge_core::config::CacheConfig;
use dealbridge_core::{DealStage, OpportunityId, UserIdentity};

#[derive(Clone, Debug, PartialEq)]
pub struct CachedDeal {
    pub id: OpportunityId,
    pub stage: DealStage,
    pub subject: Option<String>,
    pub display_name: String,
}

struct Entry {
    deal: CachedDeal,
    cached_at: Instant,
}

pub struct RecencyCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RecencyCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            capacity: config.capacity.max(2),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, identity: &UserIdentity) -> Option<CachedDeal> {
        self.get_at(identity, Instant::now())
    }

    pub fn put(&self, identity: &UserIdentity, deal: CachedDeal) {
        self.put_at(identity, deal, Instant::now());
    }

    pub fn invalidate(&self, identity: &UserIdentity) {
        self.lock().remove(&identity.0);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn get_at(&self, identity: &UserIdentity, now: Instant) -> Option<CachedDeal> {
        let mut entries = self.lock();
        match entries.get(&identity.0) {
            Some(entry) if now.duration_since(entry.cached_at) < self.ttl => {
                Some(entry.deal.clone())
            }
            Some(_) => {
                entries.remove(&identity.0);
                None
            }
            None => None,
        }
    }

    fn put_at(&self, identity: &UserIdentity, deal: CachedDeal, now: Instant) {
        let mut entries = self.lock();
        if !entries.contains_key(&identity.0) && entries.len() >= self.capacity {
            evict_oldest(&mut entries, self.capacity / 2);
        }
        entries.insert(identity.0.clone(), Entry { deal, cached_at: now });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Drops the oldest-written entries until only `keep` remain.
fn evict_oldest(entries: &mut HashMap<String, Entry>, keep: usize) {
    let excess = entries.len().saturating_sub(keep);
    if excess == 0 {
        return;
    }
    let mut by_age: Vec<(String, Instant)> = entries
        .iter()
        .map(|(key, entry)| (key.clone(), entry.cached_at))
        .collect();
    by_age.sort_by_key(|(_, cached_at)| *cached_at);
    for (key, _) in by_age.into_iter().take(excess) {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use dealbridge_core::config::CacheConfig;
    use dealbridge_core::{DealStage, OpportunityId, UserIdentity};

    use super::{CachedDeal, RecencyCache};

    fn config(ttl_secs: u64, capacity: usize) -> CacheConfig {
        CacheConfig { ttl_secs, capacity }
    }

    fn deal(id: &str) -> CachedDeal {
        CachedDeal {
            id: OpportunityId(id.to_string()),
            stage: DealStage::Inquiry,
            subject: Some("Botox".to_string()),
            display_name: format!("Botox [{id}]"),
        }
    }

    #[test]
    fn entries_expire_after_the_ttl() {
        let cache = RecencyCache::new(&config(300, 10));
        let identity = UserIdentity::new("psid-1");
        let start = Instant::now();

        cache.put_at(&identity, deal("deal-1"), start);
        assert!(cache.get_at(&identity, start + Duration::from_secs(299)).is_some());
        assert!(cache.get_at(&identity, start + Duration::from_secs(300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_resets_the_entry_age() {
        let cache = RecencyCache::new(&config(300, 10));
        let identity = UserIdentity::new("psid-1");
        let start = Instant::now();

        cache.put_at(&identity, deal("deal-1"), start);
        cache.put_at(&identity, deal("deal-1"), start + Duration::from_secs(250));
        assert!(cache.get_at(&identity, start + Duration::from_secs(500)).is_some());
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = RecencyCache::new(&config(300, 10));
        let identity = UserIdentity::new("psid-1");

        cache.put(&identity, deal("deal-1"));
        cache.invalidate(&identity);
        assert!(cache.get(&identity).is_none());
    }

    #[test]
    fn capacity_pressure_evicts_oldest_down_to_the_recent_half() {
        let cache = RecencyCache::new(&config(300, 4));
        let start = Instant::now();
        for index in 0..4 {
            let identity = UserIdentity::new(format!("psid-{index}"));
            cache.put_at(&identity, deal(&format!("deal-{index}")), start + Duration::from_secs(index));
        }

        let newcomer = UserIdentity::new("psid-9");
        cache.put_at(&newcomer, deal("deal-9"), start + Duration::from_secs(10));

        assert_eq!(cache.len(), 3);
        assert!(cache.get_at(&UserIdentity::new("psid-0"), start + Duration::from_secs(11)).is_none());
        assert!(cache.get_at(&UserIdentity::new("psid-1"), start + Duration::from_secs(11)).is_none());
        assert!(cache.get_at(&UserIdentity::new("psid-3"), start + Duration::from_secs(11)).is_some());
        assert!(cache.get_at(&newcomer, start + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn updating_an_existing_key_never_triggers_eviction() {
        let cache = RecencyCache::new(&config(300, 2));
        let start = Instant::now();
        cache.put_at(&UserIdentity::new("psid-0"), deal("deal-0"), start);
        cache.put_at(&UserIdentity::new("psid-1"), deal("deal-1"), start + Duration::from_secs(1));

        cache.put_at(&UserIdentity::new("psid-0"), deal("deal-0"), start + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);
    }
}
