//! Region and zone lookup cache.
//!
//! Region and zone codes are resolved to provider keys at most once per
//! session. Failed resolutions are not cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// What a cached code refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Region,
    Zone,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region => write!(f, "region"),
            Self::Zone => write!(f, "zone"),
        }
    }
}

/// One code's key. Empty until a resolution succeeds.
type Slot = Arc<Mutex<Option<String>>>;

/// Session-owned code-to-key cache.
#[derive(Debug, Default)]
pub struct LookupCache {
    slots: RwLock<HashMap<(LookupKind, String), Slot>>,
}

impl LookupCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: LookupKind, code: &str) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, code.to_string()))
            .cloned()
    }

    /// Cached key for a code, if resolved before.
    pub fn get(&self, kind: LookupKind, code: &str) -> Option<String> {
        let slot = self.slot(kind, code)?;
        slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cached key for a code, resolving it with `resolve` on first use.
    ///
    /// Concurrent first uses of the same code call `resolve` once. Each code
    /// has its own lock, so a slow resolution never blocks other codes.
    pub fn get_or_resolve<E, F>(
        &self,
        kind: LookupKind,
        code: &str,
        resolve: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        let slot = match self.slot(kind, code) {
            Some(slot) => slot,
            None => Arc::clone(
                self.slots
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry((kind, code.to_string()))
                    .or_default(),
            ),
        };

        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }
        let key = resolve()?;
        log::debug!("resolved {kind} {code} -> {key}");
        *cached = Some(key.clone());
        Ok(key)
    }

    /// Number of resolved codes. Waits for resolutions in flight.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Whether nothing is resolved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_resolves_once() {
        let cache = LookupCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let key = cache
                .get_or_resolve(LookupKind::Zone, "KR-2", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>("3".to_string())
                })
                .unwrap();
            assert_eq!(key, "3");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = LookupCache::new();
        let err = cache.get_or_resolve(LookupKind::Region, "XX", || Err::<String, _>("missing"));
        assert_eq!(err, Err("missing"));
        assert!(cache.is_empty());

        let ok = cache.get_or_resolve(LookupKind::Region, "XX", || Ok::<_, &str>("9".into()));
        assert_eq!(ok, Ok("9".to_string()));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let cache = LookupCache::new();
        cache
            .get_or_resolve(LookupKind::Region, "KR", || Ok::<_, ()>("1".into()))
            .unwrap();
        assert_eq!(cache.get(LookupKind::Zone, "KR"), None);
        assert_eq!(cache.get(LookupKind::Region, "KR").as_deref(), Some("1"));
    }

    #[test]
    fn test_concurrent_first_use_resolves_once() {
        let cache = Arc::new(LookupCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_resolve(LookupKind::Zone, "KR-1", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok::<_, ()>("2".to_string())
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "2");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_resolution_does_not_block_other_codes() {
        let cache = Arc::new(LookupCache::new());
        cache
            .get_or_resolve(LookupKind::Region, "KR", || Ok::<_, ()>("1".into()))
            .unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .get_or_resolve(LookupKind::Zone, "KR-1", || {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, ()>("2".to_string())
                    })
                    .unwrap()
            })
        };
        started_rx.recv().unwrap();

        assert_eq!(cache.get(LookupKind::Region, "KR").as_deref(), Some("1"));
        let other = cache.get_or_resolve(LookupKind::Region, "JP", || Ok::<_, ()>("5".into()));
        assert_eq!(other, Ok("5".to_string()));

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), "2");
        assert_eq!(cache.len(), 3);
    }
}
