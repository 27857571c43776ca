//! Reference-counted cache of per-channel workers.
//!
//! A key is registered by mapping rows (`add_usage`/`remove_usage`); its
//! worker is built lazily on first access and disposed when the last usage
//! goes away. The pool has no locking of its own: the coordinator only
//! touches it while holding its state lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A per-channel worker with an explicit shutdown.
pub trait ChannelResource: Send + Sync {
    /// Stop the worker. Must be idempotent.
    fn dispose(&self);
}

#[derive(Debug)]
struct Entry<V> {
    ref_count: usize,
    resource: Option<Arc<V>>,
}

/// Usage-counted map of lazily constructed resources.
#[derive(Debug)]
pub struct ResourcePool<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for ResourcePool<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> ResourcePool<K, V>
where
    K: Eq + Hash + Clone,
    V: ChannelResource,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more usage of `key`. Never constructs the resource.
    pub fn add_usage(&mut self, key: K) {
        self.entries
            .entry(key)
            .or_insert(Entry {
                ref_count: 0,
                resource: None,
            })
            .ref_count += 1;
    }

    /// Drop one usage of `key`; the last one disposes the resource.
    pub fn remove_usage(&mut self, key: &K) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };

        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            if let Some(entry) = self.entries.remove(key) {
                if let Some(resource) = entry.resource {
                    resource.dispose();
                }
            }
        }
    }

    /// Get the resource for a registered key, constructing it on first use.
    ///
    /// Returns `None` for keys with no usage; nothing is built for them.
    pub fn get_or_create<A, F>(&mut self, key: &K, factory: F, arg: A) -> Option<Arc<V>>
    where
        F: FnOnce(A) -> V,
    {
        let entry = self.entries.get_mut(key)?;
        let resource = entry
            .resource
            .get_or_insert_with(|| Arc::new(factory(arg)));
        Some(resource.clone())
    }

    /// The resource for `key` if it has already been constructed.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).and_then(|e| e.resource.clone())
    }

    pub fn usage(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, |e| e.ref_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispose every constructed resource and forget all usages.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            if let Some(resource) = entry.resource {
                resource.dispose();
            }
        }
    }
}
