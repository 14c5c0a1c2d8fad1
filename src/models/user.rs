use serde::Deserialize;
use std::fmt;

use crate::models::card::{Uid, UserLevel};

/// Holder name used when a card is authorized from the offline cache
pub const OFFLINE_HOLDER_NAME: &str = "???";

/// A card holder produced by one authentication attempt
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FabUser {
    pub uid: Uid,
    /// Whether the backend, cache or whitelist vouched for this card
    pub authenticated: bool,
    pub holder_name: String,
    pub level: UserLevel,
}

impl FabUser {
    pub fn new(uid: Uid, authenticated: bool, holder_name: impl Into<String>, level: UserLevel) -> Self {
        Self {
            uid,
            authenticated,
            holder_name: holder_name.into(),
            level,
        }
    }
}

impl fmt::Display for FabUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FabUser(uid={}, name={}, level={}, authenticated={})",
            self.uid, self.holder_name, self.level, self.authenticated
        )
    }
}

/// Statically configured card, consulted when backend and cache have no answer
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WhiteListEntry {
    pub uid: Uid,
    pub level: UserLevel,
    pub name: String,
}

impl WhiteListEntry {
    pub fn new(uid: Uid, level: UserLevel, name: impl Into<String>) -> Self {
        Self {
            uid,
            level,
            name: name.into(),
        }
    }
}

/// One slot of the offline cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CachedUser {
    pub uid: Uid,
    pub level: UserLevel,
}

impl CachedUser {
    pub fn new(uid: Uid, level: UserLevel) -> Self {
        Self { uid, level }
    }

    /// Empty slots carry the invalid UID
    pub fn is_empty(&self) -> bool {
        !self.uid.is_valid()
    }
}
