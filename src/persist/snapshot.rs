use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::core::error::PersistError;
use crate::models::card::{Uid, UserLevel};
use crate::models::user::CachedUser;

const HEADER_TAG: &str = "FABCACHE";
const ENTRY_TAG: &str = "CACHED";
const FORMAT_VERSION: u32 = 1;

/// Fixed-size image of the offline cache as stored on durable media
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub entries: Vec<CachedUser>,
}

impl CacheSnapshot {
    /// Snapshot with every slot empty
    pub fn empty(capacity: usize) -> Self {
        Self {
            entries: vec![CachedUser::default(); capacity],
        }
    }

    /// Build a snapshot of exactly `capacity` slots, padding or truncating
    pub fn from_slots(slots: &[CachedUser], capacity: usize) -> Self {
        let mut entries: Vec<CachedUser> = slots.iter().take(capacity).copied().collect();
        entries.resize(capacity, CachedUser::default());
        Self { entries }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Order-insensitive comparison: same multiset of (uid, level) pairs
    pub fn same_entries(&self, other: &CacheSnapshot) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let mut mine = self.entries.clone();
        let mut theirs = other.entries.clone();
        mine.sort_unstable();
        theirs.sort_unstable();
        mine == theirs
    }

    fn encode(&self) -> String {
        let mut out = format!("{}|{}|{}\n", HEADER_TAG, FORMAT_VERSION, self.capacity());
        for entry in &self.entries {
            out.push_str(&format!(
                "{}|{}|{}\n",
                ENTRY_TAG,
                hex::encode(entry.uid.to_bytes()),
                entry.level.as_u8()
            ));
        }
        out
    }

    fn decode(content: &str) -> Result<Self, PersistError> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (header_line, header) = lines.next().ok_or(PersistError::Malformed {
            line: 1,
            reason: "missing header".to_string(),
        })?;
        let capacity = parse_header(header).map_err(|reason| PersistError::Malformed {
            line: header_line,
            reason,
        })?;

        let mut entries = Vec::with_capacity(capacity);
        for (line, text) in lines {
            let entry = parse_entry(text).map_err(|reason| PersistError::Malformed { line, reason })?;
            entries.push(entry);
        }

        if entries.len() != capacity {
            return Err(PersistError::CapacityMismatch {
                expected: capacity,
                actual: entries.len(),
            });
        }

        Ok(Self { entries })
    }
}

fn parse_header(line: &str) -> Result<usize, String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 3 || parts[0] != HEADER_TAG {
        return Err("invalid header".to_string());
    }
    let version = parts[1].parse::<u32>().map_err(|_| "invalid version".to_string())?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported version {}", version));
    }
    parts[2].parse::<usize>().map_err(|_| "invalid capacity".to_string())
}

fn parse_entry(line: &str) -> Result<CachedUser, String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 3 || parts[0] != ENTRY_TAG {
        return Err("invalid entry".to_string());
    }
    let bytes = hex::decode(parts[1]).map_err(|e| format!("invalid uid hex: {}", e))?;
    if bytes.len() != crate::models::card::UID_BYTE_LEN {
        return Err("uid has wrong length".to_string());
    }
    let level = parts[2]
        .parse::<u8>()
        .map_err(|_| "invalid level".to_string())
        .and_then(|raw| UserLevel::try_from(raw).map_err(|e| e.to_string()))?;

    Ok(CachedUser::new(Uid::from_bytes(&bytes), level))
}

/// Durable storage for the offline cache
pub trait CacheStore {
    /// Stored snapshot, `None` when absent or unreadable
    fn load_snapshot(&self) -> Option<CacheSnapshot>;

    fn default_snapshot(&self) -> CacheSnapshot;

    fn save_snapshot(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError>;
}

/// Cache snapshot kept in a small text file, replaced atomically on save
pub struct FileCacheStore {
    path: PathBuf,
    capacity: usize,
}

impl FileCacheStore {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        Self { path, capacity }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<CacheSnapshot, PersistError> {
        let content = fs::read_to_string(&self.path)?;
        CacheSnapshot::decode(&content)
    }
}

impl CacheStore for FileCacheStore {
    fn load_snapshot(&self) -> Option<CacheSnapshot> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No cache snapshot on disk");
            return None;
        }

        match self.read() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Cache snapshot unreadable, ignoring it"
                );
                None
            }
        }
    }

    fn default_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::empty(self.capacity)
    }

    fn save_snapshot(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(snapshot.encode().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Volatile store, counts writes so callers can observe skipped saves
pub struct MemoryCacheStore {
    capacity: usize,
    snapshot: RefCell<Option<CacheSnapshot>>,
    writes: RefCell<usize>,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshot: RefCell::new(None),
            writes: RefCell::new(0),
        }
    }

    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            capacity: snapshot.capacity(),
            snapshot: RefCell::new(Some(snapshot)),
            writes: RefCell::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.borrow()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load_snapshot(&self) -> Option<CacheSnapshot> {
        self.snapshot.borrow().clone()
    }

    fn default_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::empty(self.capacity)
    }

    fn save_snapshot(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        *self.snapshot.borrow_mut() = Some(snapshot.clone());
        *self.writes.borrow_mut() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(n: u64, level: UserLevel) -> CachedUser {
        CachedUser::new(Uid::new(n), level)
    }

    #[test]
    fn test_snapshot_encoding() {
        let snapshot = CacheSnapshot::from_slots(&[entry(0xF6F07894, UserLevel::Admin)], 2);
        let encoded = snapshot.encode();

        let mut lines = encoded.lines();
        assert_eq!(lines.next(), Some("FABCACHE|1|2"));
        assert_eq!(lines.next(), Some("CACHED|9478f0f600000000|3"));
        assert_eq!(lines.next(), Some("CACHED|0000000000000000|0"));
        assert_eq!(CacheSnapshot::decode(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_same_entries_ignores_order() {
        let a = CacheSnapshot::from_slots(&[entry(1, UserLevel::User), entry(2, UserLevel::Admin)], 3);
        let b = CacheSnapshot::from_slots(&[entry(2, UserLevel::Admin), CachedUser::default(), entry(1, UserLevel::User)], 3);
        let c = CacheSnapshot::from_slots(&[entry(2, UserLevel::User), entry(1, UserLevel::User)], 3);

        assert!(a.same_entries(&b));
        assert!(!a.same_entries(&c));
    }

    #[test]
    fn test_decode_rejects_bad_lines() {
        assert!(CacheSnapshot::decode("").is_err());
        assert!(CacheSnapshot::decode("FABCACHE|2|1\nCACHED|0000000000000000|0\n").is_err());
        assert!(CacheSnapshot::decode("FABCACHE|1|1\nCACHED|zz|0\n").is_err());
        assert!(CacheSnapshot::decode("FABCACHE|1|1\nCACHED|0100000000000000|7\n").is_err());
        assert!(matches!(
            CacheSnapshot::decode("FABCACHE|1|2\nCACHED|0100000000000000|1\n"),
            Err(PersistError::CapacityMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_file_store_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.db");
        let store = FileCacheStore::new(path.clone(), 3);

        assert!(store.load_snapshot().is_none());

        let snapshot = CacheSnapshot::from_slots(&[entry(7, UserLevel::User), entry(8, UserLevel::Unknown)], 3);
        store.save_snapshot(&snapshot).unwrap();

        assert_eq!(store.load_snapshot(), Some(snapshot));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_corrupt_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.db");
        fs::write(&path, "garbage\n").unwrap();

        let store = FileCacheStore::new(path, 3);
        assert!(store.load_snapshot().is_none());
        assert_eq!(store.default_snapshot(), CacheSnapshot::empty(3));
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryCacheStore::new(2);
        assert!(store.load_snapshot().is_none());

        store.save_snapshot(&CacheSnapshot::empty(2)).unwrap();
        assert_eq!(store.writes(), 1);
        assert_eq!(store.load_snapshot(), Some(CacheSnapshot::empty(2)));
    }
}
