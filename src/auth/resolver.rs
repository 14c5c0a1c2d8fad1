use tracing::{debug, error, info};

use crate::api::backend::BackendClient;
use crate::core::error::PersistError;
use crate::models::card::{Uid, UserLevel};
use crate::models::user::{CachedUser, FabUser, WhiteListEntry, OFFLINE_HOLDER_NAME};
use crate::persist::snapshot::{CacheSnapshot, CacheStore};
use crate::stores::user_cache::UserCache;

/// Outcome of one authentication attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Authorized(FabUser),
    /// Card is known and access was refused or revoked
    Denied,
    /// Card matched nowhere
    Unknown,
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized(_))
    }

    pub fn user(&self) -> Option<&FabUser> {
        match self {
            Decision::Authorized(user) => Some(user),
            _ => None,
        }
    }
}

/// Result of a cache save request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Stored snapshot already held the same entries, nothing written
    Unchanged,
    Written,
}

/// Tiered card authorization: backend first, then offline cache, then whitelist
pub struct AuthResolver {
    whitelist: Vec<WhiteListEntry>,
    cache: UserCache,
}

impl AuthResolver {
    pub fn new(whitelist: Vec<WhiteListEntry>, cache_capacity: usize) -> Self {
        Self {
            whitelist,
            cache: UserCache::with_capacity(cache_capacity),
        }
    }

    /// Decide whether `uid` may use the machine
    ///
    /// An explicit refusal from the backend is final and revokes any cached
    /// grant. A missing or malformed reply falls back to cache and whitelist.
    pub fn try_login(&mut self, uid: Uid, backend: &mut dyn BackendClient) -> Decision {
        debug!(uid = %uid, "Authorization requested");

        if !backend.is_online() {
            backend.connect();
        }

        if backend.is_online() {
            let response = backend.check_card(uid);
            if response.request_ok {
                if response.is_authorized() {
                    let user = FabUser::new(uid, true, response.holder_name, response.user_level);
                    self.update_cache(uid, response.user_level);
                    debug!(user = %user, "Online check OK");
                    return Decision::Authorized(user);
                }

                self.update_cache(uid, UserLevel::Unknown);
                info!(uid = %uid, result = ?response.result, "Card refused by backend");
                return Decision::Denied;
            }

            debug!(uid = %uid, "Online check inconclusive, trying offline sources");
        }

        if let Some(cached) = self.lookup_cache(uid) {
            if !cached.level.is_granted() {
                debug!(uid = %uid, "Card revoked in cache");
                return Decision::Denied;
            }
            let user = FabUser::new(uid, true, OFFLINE_HOLDER_NAME, cached.level);
            debug!(user = %user, "Cache check OK");
            return Decision::Authorized(user);
        }

        if let Some(entry) = self.lookup_whitelist(uid) {
            let user = FabUser::new(uid, true, entry.name.clone(), entry.level);
            debug!(user = %user, "Whitelist check OK");
            return Decision::Authorized(user);
        }

        debug!(uid = %uid, "Card not found in any source");
        Decision::Unknown
    }

    pub fn update_cache(&mut self, uid: Uid, level: UserLevel) {
        self.cache.update(uid, level);
    }

    pub fn lookup_cache(&self, uid: Uid) -> Option<CachedUser> {
        let found = self.cache.get(uid);
        if found.is_none() {
            debug!(uid = %uid, "Not found in cache");
        }
        found
    }

    pub fn lookup_whitelist(&self, uid: Uid) -> Option<&WhiteListEntry> {
        let found = self.whitelist.iter().find(|entry| entry.uid == uid);
        if found.is_none() {
            debug!(uid = %uid, "Not found in whitelist");
        }
        found
    }

    /// Replace the in-memory cache with the stored snapshot
    ///
    /// A missing or unreadable snapshot leaves an empty cache.
    pub fn load_cache(&mut self, store: &dyn CacheStore) {
        match store.load_snapshot() {
            Some(snapshot) => {
                self.cache.load(&snapshot.entries);
                info!(cached_cards = self.cache.len(), "Cache loaded");
            }
            None => {
                self.cache.clear();
                info!("No usable cache snapshot, starting empty");
            }
        }
    }

    /// Persist the cache unless the stored copy holds the same entries
    pub fn save_cache(&self, store: &dyn CacheStore) -> Result<SaveOutcome, PersistError> {
        let current = CacheSnapshot::from_slots(self.cache.slots(), self.cache.capacity());
        let stored = store
            .load_snapshot()
            .unwrap_or_else(|| store.default_snapshot());

        if stored.same_entries(&current) {
            debug!("Cache unchanged, not saving");
            return Ok(SaveOutcome::Unchanged);
        }

        store.save_snapshot(&current).map_err(|e| {
            error!(error = %e, "Failed to save cache");
            e
        })?;
        debug!(cached_cards = self.cache.len(), "Cache saved");
        Ok(SaveOutcome::Written)
    }

    pub fn set_whitelist(&mut self, whitelist: Vec<WhiteListEntry>) {
        self.whitelist = whitelist;
    }

    pub fn whitelist(&self) -> &[WhiteListEntry] {
        &self.whitelist
    }

    pub fn cache(&self) -> &UserCache {
        &self.cache
    }
}
