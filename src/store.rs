//! Concurrent keyed store with replace-only slots.
//!
//! Values live behind `Arc` and are swapped wholesale on every write, so a
//! reader gets either the previous or the new value and never a partial one.
//! Reads only hold a shard read guard long enough to clone the `Arc`; the
//! caller copies whatever it needs out of the value after every guard is
//! released.

use std::sync::Arc;

use dashmap::DashMap;

/// Result of looking up a `(domain, role)` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    DomainNotFound,
    RoleNotFound,
    Found(V),
}

impl<V> Lookup<V> {
    pub fn found(self) -> Option<V> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Domain → role → latest value.
#[derive(Debug)]
pub struct KeyedStore<V> {
    domains: DashMap<String, DashMap<String, Arc<V>>>,
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self { domains: DashMap::new() }
    }
}

impl<V> KeyedStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot for `(domain, role)`, returning the previous value.
    pub fn insert(&self, domain: &str, role: &str, value: V) -> Option<Arc<V>> {
        let value = Arc::new(value);
        if let Some(roles) = self.domains.get(domain) {
            return roles.insert(role.to_string(), value);
        }
        self.domains.entry(domain.to_string()).or_default().insert(role.to_string(), value)
    }

    pub fn get(&self, domain: &str, role: &str) -> Lookup<Arc<V>> {
        let Some(roles) = self.domains.get(domain) else {
            return Lookup::DomainNotFound;
        };
        let slot = roles.get(role).map(|entry| Arc::clone(entry.value()));
        match slot {
            Some(value) => Lookup::Found(value),
            None => Lookup::RoleNotFound,
        }
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.domains.iter().map(|roles| roles.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every slot, ordered by domain then role.
    pub fn snapshot(&self) -> Vec<(String, String, Arc<V>)> {
        let mut entries = Vec::new();
        for domain in self.domains.iter() {
            for role in domain.value().iter() {
                entries.push((domain.key().clone(), role.key().clone(), Arc::clone(role.value())));
            }
        }
        entries.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_lookup_distinguishes_missing_domain_and_role() {
        let store = KeyedStore::new();
        assert_eq!(store.get("sys.auth", "readers"), Lookup::DomainNotFound);

        store.insert("sys.auth", "readers", "token-1".to_string());
        assert_eq!(store.get("sys.auth", "writers"), Lookup::RoleNotFound);
        assert_eq!(store.get("sys.auth", "readers").found().as_deref().map(String::as_str), Some("token-1"));
    }

    #[test]
    fn test_insert_replaces_wholesale() {
        let store = KeyedStore::new();
        assert!(store.insert("media", "viewers", 1u32).is_none());

        let before = store.get("media", "viewers").found().unwrap();
        let previous = store.insert("media", "viewers", 2u32).unwrap();

        // A reader holding the old Arc keeps a consistent value.
        assert_eq!(*before, 1);
        assert_eq!(*previous, 1);
        assert_eq!(*store.get("media", "viewers").found().unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let store = KeyedStore::new();
        store.insert("b.domain", "r1", 3);
        store.insert("a.domain", "r2", 2);
        store.insert("a.domain", "r1", 1);

        let keys: Vec<(String, String)> =
            store.snapshot().into_iter().map(|(d, r, _)| (d, r)).collect();
        assert_eq!(
            keys,
            vec![
                ("a.domain".to_string(), "r1".to_string()),
                ("a.domain".to_string(), "r2".to_string()),
                ("b.domain".to_string(), "r1".to_string()),
            ]
        );
        assert!(!store.is_empty());
    }

    #[test]
    fn test_reads_stay_consistent_during_concurrent_writes() {
        // Values are (n, n * 2); a torn read would break the relation.
        let store = Arc::new(KeyedStore::<(u64, u64)>::new());
        store.insert("sys.auth", "readers", (0, 0));
        let barrier = Arc::new(Barrier::new(3));

        let writer = {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 1..20_000u64 {
                    store.insert("sys.auth", "readers", (n, n * 2));
                    store.insert("sys.auth", &format!("role-{}", n % 16), (n, n * 2));
                }
            })
        };

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut slowest = Duration::ZERO;
                    for _ in 0..20_000 {
                        let started = Instant::now();
                        let value = store.get("sys.auth", "readers").found().unwrap();
                        slowest = slowest.max(started.elapsed());
                        assert_eq!(value.1, value.0 * 2);
                    }
                    slowest
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            assert!(reader.join().unwrap() < Duration::from_secs(1));
        }
    }
}
