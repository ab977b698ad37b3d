//! Invoker cache
//!
//! Compiles each `(allocator, signature)` pair once and hands out shared
//! invokers afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::abi::AbiAllocator;
use crate::invoke::Invoker;
use crate::UnaResult;

/// Thread-safe cache of compiled invokers
#[derive(Default)]
pub struct InvokerCache {
    /// allocator → signature text → compiled invoker
    entries: RwLock<FxHashMap<AbiAllocator, FxHashMap<String, Arc<Invoker>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl InvokerCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or compile the invoker for `signature`.
    pub fn get(&self, abi: &AbiAllocator, signature: &str) -> UnaResult<Arc<Invoker>> {
        if let Some(invoker) = self
            .entries
            .read()
            .get(abi)
            .and_then(|by_sig| by_sig.get(signature))
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(invoker));
        }

        // Compiled outside the lock; the first insert wins a race.
        let compiled = Arc::new(abi.of(signature)?);
        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write();
        let by_sig = entries.entry(abi.clone()).or_default();
        Ok(Arc::clone(
            by_sig.entry(signature.to_string()).or_insert(compiled),
        ))
    }

    /// Number of cached invokers
    pub fn len(&self) -> usize {
        self.entries.read().values().map(FxHashMap::len).sum()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().values().all(FxHashMap::is_empty)
    }

    /// Lookups served from the cache
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that compiled
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drop every cached invoker
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_shape_compiles_once() {
        let cache = InvokerCache::new();
        let abi = AbiAllocator::X86_64_UNIX;
        let a = cache.get(&abi, "i(ii)").unwrap();
        let b = cache.get(&abi, "i(ii)").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_allocator_is_part_of_key() {
        let cache = InvokerCache::new();
        let unix = cache.get(&AbiAllocator::X86_64_UNIX, "v(d)").unwrap();
        let win = cache.get(&AbiAllocator::X86_64_WINDOWS, "v(d)").unwrap();
        assert!(!Arc::ptr_eq(&unix, &win));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_by_borrowed_signature() {
        let cache = InvokerCache::new();
        let abi = AbiAllocator::X86_64_WINDOWS;
        let owned = String::from("d(idif)");
        let first = cache.get(&abi, &owned).unwrap();
        drop(owned);
        for _ in 0..3 {
            assert!(Arc::ptr_eq(&first, &cache.get(&abi, "d(idif)").unwrap()));
        }
        cache.get(&abi, "v()").unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!((cache.hits(), cache.misses()), (3, 2));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = InvokerCache::new();
        assert!(cache.get(&AbiAllocator::X86_64_UNIX, "i(").is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(InvokerCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.get(&AbiAllocator::X86_CDECL, "l(ll)").unwrap()
                })
            })
            .collect();
        let invokers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        assert!(invokers.iter().all(|inv| **inv == *invokers[0]));
    }
}
