//! Short-lived key/value storage with per-entry TTL.
//!
//! Only the withdrawal flow uses it: an unverified request sits here until the
//! owner clicks the verification link or the entry silently expires.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};

use crate::notify::BoxError;

pub trait EphemeralCache: Send + Sync {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), BoxError>;
    /// Returns `None` for missing and expired keys alike.
    fn get(&self, key: &str) -> Result<Option<String>, BoxError>;
    fn del(&self, key: &str) -> Result<(), BoxError>;
}

/// In-process cache. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EphemeralCache for MemoryCache {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), BoxError> {
        let ttl = chrono::Duration::from_std(ttl)?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or("cache ttl out of range")?;
        let mut entries = self.entries.lock().map_err(|_| "cache lock poisoned")?;
        entries.retain(|_, (_, exp)| *exp > Utc::now());
        entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        let mut entries = self.entries.lock().map_err(|_| "cache lock poisoned")?;
        match entries.get(key) {
            Some((value, exp)) if *exp > Utc::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn del(&self, key: &str) -> Result<(), BoxError> {
        self.entries
            .lock()
            .map_err(|_| "cache lock poisoned")?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_del() {
        let cache = MemoryCache::new();
        cache
            .set("token", "payload".to_string(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("token").unwrap(), Some("payload".to_string()));
        assert_eq!(cache.len(), 1);

        cache.del("token").unwrap();
        assert_eq!(cache.get("token").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = MemoryCache::new();
        cache
            .set("token", "payload".to_string(), Duration::ZERO)
            .unwrap();
        assert_eq!(cache.get("token").unwrap(), None);
        assert!(cache.is_empty());
    }
}
