use crate::models::card::{Uid, UserLevel};
use crate::models::user::CachedUser;

/// Bounded offline cache of recently seen cards
///
/// Fixed number of slots used as a ring. A card occupies at most one slot:
/// updates overwrite a matching slot in place, otherwise the slot under the
/// cursor is reused (oldest insertion first).
#[derive(Clone, Debug)]
pub struct UserCache {
    slots: Vec<CachedUser>,
    cursor: usize,
}

impl UserCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![CachedUser::default(); capacity.max(1)],
            cursor: 0,
        }
    }

    /// Record the level for a card
    pub fn update(&mut self, uid: Uid, level: UserLevel) {
        if !uid.is_valid() {
            tracing::warn!("Refusing to cache the invalid card UID");
            return;
        }

        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.uid == uid) {
            slot.level = level;
            return;
        }

        let capacity = self.slots.len();
        let evicted = std::mem::replace(&mut self.slots[self.cursor], CachedUser::new(uid, level));
        if !evicted.is_empty() {
            tracing::debug!(evicted = %evicted.uid, slot = self.cursor, "Cache slot reused");
        }
        self.cursor = (self.cursor + 1) % capacity;
    }

    pub fn get(&self, uid: Uid) -> Option<CachedUser> {
        if !uid.is_valid() {
            return None;
        }
        self.slots.iter().find(|slot| slot.uid == uid).copied()
    }

    /// Replace the contents from a persisted snapshot
    ///
    /// Empty slots and repeated UIDs are skipped, entries beyond capacity are
    /// dropped. Loaded entries are packed at the front and the cursor points
    /// at the first free slot, or at the oldest entry when full.
    pub fn load(&mut self, entries: &[CachedUser]) {
        let capacity = self.slots.len();
        self.slots.fill(CachedUser::default());

        let mut occupied = 0;
        for entry in entries.iter().filter(|entry| !entry.is_empty()) {
            if occupied == capacity {
                break;
            }
            if self.slots[..occupied].iter().any(|slot| slot.uid == entry.uid) {
                tracing::warn!(uid = %entry.uid, "Duplicate card in cache snapshot, keeping the first");
                continue;
            }
            self.slots[occupied] = *entry;
            occupied += 1;
        }
        self.cursor = occupied % capacity;
    }

    /// All slots, empty ones included, in storage order
    pub fn slots(&self) -> &[CachedUser] {
        &self.slots
    }

    pub fn clear(&mut self) {
        self.slots.fill(CachedUser::default());
        self.cursor = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    #[test]
    fn test_update_inserts() {
        let mut cache = UserCache::with_capacity(4);
        cache.update(uid(1), UserLevel::User);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(uid(1)), Some(CachedUser::new(uid(1), UserLevel::User)));
        assert_eq!(cache.get(uid(2)), None);
    }

    #[test]
    fn test_update_in_place_keeps_size() {
        let mut cache = UserCache::with_capacity(4);
        cache.update(uid(1), UserLevel::User);
        cache.update(uid(2), UserLevel::User);
        cache.update(uid(1), UserLevel::Admin);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(uid(1)).unwrap().level, UserLevel::Admin);
        let matching = cache.slots().iter().filter(|s| s.uid == uid(1)).count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mut cache = UserCache::with_capacity(3);
        for n in 1..=3 {
            cache.update(uid(n), UserLevel::User);
        }

        cache.update(uid(4), UserLevel::Staff);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(uid(1)), None);
        assert_eq!(cache.get(uid(4)).unwrap().level, UserLevel::Staff);
        assert!(cache.get(uid(2)).is_some());
        assert!(cache.get(uid(3)).is_some());

        cache.update(uid(5), UserLevel::User);
        assert_eq!(cache.get(uid(2)), None);
        assert!(cache.get(uid(5)).is_some());
    }

    #[test]
    fn test_update_of_present_uid_does_not_advance_cursor() {
        let mut cache = UserCache::with_capacity(2);
        cache.update(uid(1), UserLevel::User);
        cache.update(uid(1), UserLevel::Unknown);
        cache.update(uid(2), UserLevel::User);

        assert!(cache.get(uid(1)).is_some());
        assert!(cache.get(uid(2)).is_some());
    }

    #[test]
    fn test_invalid_uid_is_ignored() {
        let mut cache = UserCache::with_capacity(2);
        cache.update(Uid::INVALID, UserLevel::Admin);

        assert!(cache.is_empty());
        assert_eq!(cache.get(Uid::INVALID), None);
    }

    #[test]
    fn test_load_caps_at_capacity() {
        let mut cache = UserCache::with_capacity(2);
        let entries: Vec<CachedUser> = (1..=5)
            .map(|n| CachedUser::new(uid(n), UserLevel::User))
            .collect();

        cache.load(&entries);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(uid(1)).is_some());
        assert!(cache.get(uid(2)).is_some());
        assert_eq!(cache.get(uid(3)), None);
    }

    #[test]
    fn test_load_resets_cursor_after_entries() {
        let mut cache = UserCache::with_capacity(3);
        cache.load(&[CachedUser::new(uid(1), UserLevel::User)]);

        cache.update(uid(2), UserLevel::User);
        assert_eq!(cache.slots()[1].uid, uid(2));
    }

    #[test]
    fn test_load_padded_snapshot_fills_free_slots_first() {
        let mut cache = UserCache::with_capacity(4);
        cache.load(&[
            CachedUser::default(),
            CachedUser::new(uid(1), UserLevel::Unknown),
            CachedUser::default(),
            CachedUser::default(),
        ]);

        cache.update(uid(2), UserLevel::User);
        cache.update(uid(3), UserLevel::User);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(uid(1)).unwrap().level, UserLevel::Unknown);
        assert!(cache.get(uid(2)).is_some());
        assert!(cache.get(uid(3)).is_some());
    }

    #[test]
    fn test_load_full_snapshot_evicts_first_entry() {
        let mut cache = UserCache::with_capacity(2);
        cache.load(&[
            CachedUser::new(uid(1), UserLevel::User),
            CachedUser::new(uid(2), UserLevel::User),
        ]);

        cache.update(uid(3), UserLevel::User);

        assert_eq!(cache.get(uid(1)), None);
        assert!(cache.get(uid(2)).is_some());
        assert!(cache.get(uid(3)).is_some());
    }

    #[test]
    fn test_load_skips_duplicate_uids() {
        let mut cache = UserCache::with_capacity(3);
        cache.load(&[
            CachedUser::new(uid(1), UserLevel::Unknown),
            CachedUser::new(uid(1), UserLevel::Admin),
            CachedUser::new(uid(2), UserLevel::User),
        ]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(uid(1)).unwrap().level, UserLevel::Unknown);
        let matching = cache.slots().iter().filter(|s| s.uid == uid(1)).count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = UserCache::with_capacity(2);
        cache.update(uid(1), UserLevel::User);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);
    }
}
