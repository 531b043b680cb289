//! Shared key-value store
//!
//! Single source of truth for every piece of mutable state: nonces, game
//! sessions, player records, referral mappings. Entries carry an optional
//! TTL and every cross-request invariant is enforced through `update` /
//! `update_pair`, which run a caller-supplied script while holding the
//! per-key lock. Plain read-then-write from callers is reserved for
//! operations with no cross-request invariant.

use crate::errors::{CoreError, CoreResult};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::debug;

/// What a script wants done with the entry it inspected.
pub enum Write<T> {
    /// Leave the entry exactly as found.
    Unchanged,
    /// Replace the entry, refreshing its TTL when one is given.
    Put(T, Option<Duration>),
    /// Remove the entry.
    Delete,
}

/// One stored value plus its expiry deadline.
#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// A slot is the lockable home of one key. `None` means logically absent;
/// the slot itself stays around so concurrent scripts on the same key keep
/// contending on one mutex.
type Slot = Option<Entry>;

/// In-process shared store with per-key atomic scripts.
///
/// All handlers in this process observe one consistent view, and the
/// per-key mutex is the linearization point for every multi-step mutation.
pub struct KvStore {
    slots: DashMap<String, Arc<Mutex<Slot>>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Run `f` with the key's slot locked. Retries if the sweeper removed
    /// the slot between lookup and lock.
    fn with_slot<R>(&self, key: &str, f: impl FnOnce(&mut Slot) -> R) -> R {
        loop {
            let arc = {
                let entry = self
                    .slots
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(None)));
                entry.clone()
            };
            let mut guard = lock(&arc);
            let still_current = self
                .slots
                .get(key)
                .map(|e| Arc::ptr_eq(&e, &arc))
                .unwrap_or(false);
            if !still_current {
                drop(guard);
                continue;
            }
            let now = Instant::now();
            if guard.as_ref().map(|e| e.is_expired(now)).unwrap_or(false) {
                *guard = None;
            }
            return f(&mut guard);
        }
    }

    /// Store a raw string with an optional TTL, overwriting any prior value.
    pub fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.with_slot(key, |slot| *slot = Some(entry));
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.with_slot(key, |slot| slot.as_ref().map(|e| e.value.clone()))
    }

    /// Atomic read-then-delete. Exactly one caller can observe a value.
    pub fn take_string(&self, key: &str) -> Option<String> {
        self.with_slot(key, |slot| slot.take().map(|e| e.value))
    }

    pub fn del(&self, key: &str) -> bool {
        self.with_slot(key, |slot| slot.take().is_some())
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CoreResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.set_string(key, &encoded, ttl);
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.get_string(key) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The atomic-script primitive. `f` sees the decoded current value
    /// (None when absent or expired) and returns a write instruction plus
    /// a typed payload; no interleaving with other scripts on this key.
    pub fn update<T, R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<T>) -> (Write<T>, R),
    ) -> CoreResult<R>
    where
        T: Serialize + DeserializeOwned,
    {
        self.with_slot(key, |slot| {
            let current: Option<T> = match slot.as_ref() {
                Some(entry) => Some(serde_json::from_str(&entry.value)?),
                None => None,
            };
            let (write, result) = f(current);
            apply(slot, write)?;
            Ok(result)
        })
    }

    /// Two-key atomic script. Locks are taken in sorted key order so that
    /// concurrent pair scripts cannot deadlock; `f` still receives the
    /// values in the order the keys were passed.
    pub fn update_pair<T, R>(
        &self,
        key_a: &str,
        key_b: &str,
        f: impl FnOnce(Option<T>, Option<T>) -> (Write<T>, Write<T>, R),
    ) -> CoreResult<R>
    where
        T: Serialize + DeserializeOwned,
    {
        if key_a == key_b {
            return Err(CoreError::Internal(
                "update_pair requires distinct keys".to_string(),
            ));
        }
        let swapped = key_a > key_b;
        let (first, second) = if swapped { (key_b, key_a) } else { (key_a, key_b) };

        self.with_slot(first, |slot_1| {
            self.with_slot(second, |slot_2| {
                let decode = |slot: &Slot| -> CoreResult<Option<T>> {
                    match slot.as_ref() {
                        Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
                        None => Ok(None),
                    }
                };
                let v1 = decode(slot_1)?;
                let v2 = decode(slot_2)?;
                let (write_a, write_b, result) = if swapped {
                    let (wa, wb, r) = f(v2, v1);
                    (wb, wa, r)
                } else {
                    f(v1, v2)
                };
                apply(slot_1, write_a)?;
                apply(slot_2, write_b)?;
                Ok(result)
            })
        })
    }

    /// Clone the `(key, slot)` pairs out of the map without touching any
    /// slot mutex. Slot locks are never taken while a map shard guard is
    /// held; that ordering is what keeps scans and sweeps deadlock-free.
    fn snapshot_slots(&self, prefix: &str) -> Vec<(String, Arc<Mutex<Slot>>)> {
        self.slots
            .iter()
            .filter(|item| item.key().starts_with(prefix))
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }

    /// Snapshot of all live `(key, raw value)` pairs under a prefix.
    /// Read-only and unordered; used by the informational read paths.
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        let now = Instant::now();
        let mut out = Vec::new();
        for (key, arc) in self.snapshot_slots(prefix) {
            let guard = lock(&arc);
            if let Some(entry) = guard.as_ref() {
                if !entry.is_expired(now) {
                    out.push((key, entry.value.clone()));
                }
            }
        }
        out
    }

    /// Drop expired entries and their slots. Reads already treat expired
    /// entries as absent; this just bounds memory.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for (key, arc) in self.snapshot_slots("") {
            let mut guard = lock(&arc);
            let stale = match guard.as_ref() {
                Some(entry) => entry.is_expired(now),
                None => true,
            };
            if stale {
                *guard = None;
                self.slots.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("swept {} expired store entries", removed);
        }
        removed
    }

    /// Periodic sweep so abandoned sessions and nonces get garbage
    /// collected even when never touched again.
    pub fn start_sweep_task(store: Arc<KvStore>, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.sweep_expired();
            }
        });
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(slot: &mut Slot, write: Write<impl Serialize>) -> CoreResult<()> {
    match write {
        Write::Unchanged => {}
        Write::Put(value, ttl) => {
            *slot = Some(Entry {
                value: serde_json::to_string(&value)?,
                expires_at: ttl.map(|d| Instant::now() + d),
            });
        }
        Write::Delete => *slot = None,
    }
    Ok(())
}

fn lock(arc: &Arc<Mutex<Slot>>) -> MutexGuard<'_, Slot> {
    arc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_take_is_one_shot() {
        let store = KvStore::new();
        store.set_string("nonce:0xabc", "deadbeef", None);
        assert_eq!(store.take_string("nonce:0xabc").as_deref(), Some("deadbeef"));
        assert_eq!(store.take_string("nonce:0xabc"), None);
    }

    #[test]
    fn test_ttl_expiry_reads_as_absent() {
        let store = KvStore::new();
        store.set_string("k", "v", Some(Duration::from_millis(5)));
        assert!(store.get_string("k").is_some());
        thread::sleep(Duration::from_millis(20));
        assert!(store.get_string("k").is_none());
    }

    #[test]
    fn test_overwrite_replaces_value_and_ttl() {
        let store = KvStore::new();
        store.set_string("k", "old", Some(Duration::from_millis(5)));
        store.set_string("k", "new", Some(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get_string("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_update_script_sees_consistent_value() {
        let store = Arc::new(KvStore::new());
        store.set_json("counter", &0u64, None).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store
                        .update::<u64, ()>("counter", |cur| {
                            let next = cur.unwrap_or(0) + 1;
                            (Write::Put(next, None), ())
                        })
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get_json::<u64>("counter").unwrap(), Some(800));
    }

    #[test]
    fn test_update_can_delete_atomically() {
        let store = KvStore::new();
        store.set_json("k", &1u64, None).unwrap();
        let seen = store
            .update::<u64, Option<u64>>("k", |cur| (Write::Delete, cur))
            .unwrap();
        assert_eq!(seen, Some(1));
        assert!(store.get_string("k").is_none());
    }

    #[test]
    fn test_update_pair_preserves_argument_order() {
        let store = KvStore::new();
        store.set_json("b", &2u64, None).unwrap();
        store.set_json("a", &1u64, None).unwrap();
        // Pass keys in reverse sort order; values must still match keys.
        let (va, vb) = store
            .update_pair::<u64, _>("b", "a", |b, a| {
                (Write::Unchanged, Write::Unchanged, (b, a))
            })
            .unwrap();
        assert_eq!(va, Some(2));
        assert_eq!(vb, Some(1));
    }

    #[test]
    fn test_pair_scripts_do_not_deadlock() {
        let store = Arc::new(KvStore::new());
        store.set_json("x", &0u64, None).unwrap();
        store.set_json("y", &0u64, None).unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            // Half the threads pass the keys in the opposite order.
            let (k1, k2) = if i % 2 == 0 { ("x", "y") } else { ("y", "x") };
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    store
                        .update_pair::<u64, ()>(k1, k2, |a, b| {
                            (
                                Write::Put(a.unwrap_or(0) + 1, None),
                                Write::Put(b.unwrap_or(0) + 1, None),
                                (),
                            )
                        })
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get_json::<u64>("x").unwrap(), Some(800));
        assert_eq!(store.get_json::<u64>("y").unwrap(), Some(800));
    }

    #[test]
    fn test_scan_prefix_skips_expired() {
        let store = KvStore::new();
        store.set_string("player:0xa", "1", None);
        store.set_string("player:0xb", "2", Some(Duration::from_millis(5)));
        store.set_string("game:1", "3", None);
        thread::sleep(Duration::from_millis(20));
        let found = store.scan_prefix("player:");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "player:0xa");
    }

    #[test]
    fn test_sweep_removes_expired_slots() {
        let store = KvStore::new();
        store.set_string("a", "1", Some(Duration::from_millis(5)));
        store.set_string("b", "2", None);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.get_string("b").as_deref(), Some("2"));
    }
}
