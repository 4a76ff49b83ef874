//! Fixed-size connection registry.
//!
//! The server keeps one slot per allowed connection:
//!
//! ```text
//! slot:   0           1       2           ...  max_connections - 1
//!         Occupied    Empty   Occupied         Empty
//!         (gen 3)             (gen 1)
//! ```
//!
//! Every occupation bumps the slot's generation. `free` takes the
//! [`SlotToken`] returned by `try_occupy`, so a late free issued for an old
//! occupant leaves the slot's next occupant alone. The occupied count always
//! equals the number of non-empty slots.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

/// Identifies one occupation of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotToken {
    index: usize,
    generation: u64,
}

impl SlotToken {
    /// Slot position.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Occupation generation of the slot.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}#{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<H> {
    generation: u64,
    handle: Option<H>,
}

#[derive(Debug)]
struct Slots<H> {
    slots: Vec<Slot<H>>,
    occupied: usize,
}

/// Slot table mapping connection slots to connection handles.
pub struct ConnectionRegistry<H> {
    inner: Mutex<Slots<H>>,
    vacancy: Notify,
}

impl<H: Clone> ConnectionRegistry<H> {
    /// Create a registry with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                handle: None,
            })
            .collect();

        Self {
            inner: Mutex::new(Slots { slots, occupied: 0 }),
            vacancy: Notify::new(),
        }
    }

    /// Put `handle` into the lowest empty slot.
    ///
    /// Returns the handle back when every slot is taken, so the caller can
    /// close it.
    pub fn try_occupy(&self, handle: H) -> Result<SlotToken, H> {
        let mut inner = self.lock();

        let Some(index) = inner.slots.iter().position(|s| s.handle.is_none()) else {
            return Err(handle);
        };

        let slot = &mut inner.slots[index];
        slot.generation += 1;
        slot.handle = Some(handle);
        let token = SlotToken {
            index,
            generation: slot.generation,
        };
        inner.occupied += 1;

        Ok(token)
    }

    /// Empty the slot named by `token`.
    ///
    /// Returns the removed handle, or `None` if that occupation already ended.
    pub fn free(&self, token: SlotToken) -> Option<H> {
        let handle = {
            let mut inner = self.lock();
            let slot = inner.slots.get_mut(token.index)?;
            if slot.generation != token.generation {
                return None;
            }
            let handle = slot.handle.take()?;
            inner.occupied -= 1;
            handle
        };

        self.vacancy.notify_one();
        Some(handle)
    }

    /// Handle currently held by the occupation `token`, if it is still live.
    pub fn get(&self, token: SlotToken) -> Option<H> {
        let inner = self.lock();
        let slot = inner.slots.get(token.index)?;
        if slot.generation != token.generation {
            return None;
        }
        slot.handle.clone()
    }

    /// Visit every occupied slot in index order.
    ///
    /// The lock is taken once per slot and released before `f` runs, so `f`
    /// may free slots or perform I/O.
    pub fn for_each_occupied<F>(&self, mut f: F)
    where
        F: FnMut(SlotToken, H),
    {
        let capacity = self.capacity();
        for index in 0..capacity {
            let entry = {
                let inner = self.lock();
                let slot = &inner.slots[index];
                slot.handle.clone().map(|h| {
                    (
                        SlotToken {
                            index,
                            generation: slot.generation,
                        },
                        h,
                    )
                })
            };

            if let Some((token, handle)) = entry {
                f(token, handle);
            }
        }
    }

    /// Copy of every occupied slot, in index order.
    pub fn snapshot(&self) -> Vec<(SlotToken, H)> {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.handle.clone().map(|h| {
                    (
                        SlotToken {
                            index,
                            generation: slot.generation,
                        },
                        h,
                    )
                })
            })
            .collect()
    }

    /// Number of occupied slots.
    pub fn occupied_count(&self) -> usize {
        self.lock().occupied
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        let inner = self.lock();
        inner.occupied == inner.slots.len()
    }

    /// Empty every slot and return the removed handles.
    pub fn clear(&self) -> Vec<H> {
        let removed: Vec<H> = {
            let mut inner = self.lock();
            inner.occupied = 0;
            inner
                .slots
                .iter_mut()
                .filter_map(|slot| slot.handle.take())
                .collect()
        };

        if !removed.is_empty() {
            self.vacancy.notify_one();
        }
        removed
    }

    /// Wait until at least one slot is empty.
    pub async fn vacancy(&self) {
        loop {
            let notified = self.vacancy.notified();
            if !self.is_full() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<H>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<H> fmt::Debug for ConnectionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (occupied, capacity) = match self.inner.lock() {
            Ok(inner) => (inner.occupied, inner.slots.len()),
            Err(poisoned) => {
                let inner = poisoned.into_inner();
                (inner.occupied, inner.slots.len())
            }
        };
        f.debug_struct("ConnectionRegistry")
            .field("occupied", &occupied)
            .field("capacity", &capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_occupy_until_full() {
        let registry = ConnectionRegistry::new(2);

        let a = registry.try_occupy("a").unwrap();
        let b = registry.try_occupy("b").unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(registry.is_full());

        assert_eq!(registry.try_occupy("c"), Err("c"));
        assert_eq!(registry.occupied_count(), 2);
    }

    #[test]
    fn test_freed_slot_is_reusable() {
        let registry = ConnectionRegistry::new(1);

        let first = registry.try_occupy(1).unwrap();
        assert_eq!(registry.free(first), Some(1));
        assert_eq!(registry.occupied_count(), 0);

        let second = registry.try_occupy(2).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert_eq!(registry.get(second), Some(2));
    }

    #[test]
    fn test_free_twice_is_noop() {
        let registry = ConnectionRegistry::new(1);
        let token = registry.try_occupy(()).unwrap();

        assert!(registry.free(token).is_some());
        assert!(registry.free(token).is_none());
        assert_eq!(registry.occupied_count(), 0);
    }

    #[test]
    fn test_stale_free_keeps_new_occupant() {
        let registry = ConnectionRegistry::new(1);

        let old = registry.try_occupy("old").unwrap();
        registry.free(old);
        let new = registry.try_occupy("new").unwrap();

        assert!(registry.free(old).is_none());
        assert_eq!(registry.get(new), Some("new"));
        assert_eq!(registry.occupied_count(), 1);
    }

    #[test]
    fn test_snapshot_and_for_each_skip_empty() {
        let registry = ConnectionRegistry::new(3);
        let a = registry.try_occupy('a').unwrap();
        registry.try_occupy('b').unwrap();
        registry.try_occupy('c').unwrap();
        registry.free(a);

        let snapshot: Vec<char> = registry.snapshot().into_iter().map(|(_, h)| h).collect();
        assert_eq!(snapshot, vec!['b', 'c']);

        let mut visited = Vec::new();
        registry.for_each_occupied(|token, h| visited.push((token.index(), h)));
        assert_eq!(visited, vec![(1, 'b'), (2, 'c')]);
    }

    #[test]
    fn test_for_each_may_free() {
        let registry = ConnectionRegistry::new(3);
        for i in 0..3 {
            registry.try_occupy(i).unwrap();
        }

        registry.for_each_occupied(|token, _| {
            registry.free(token);
        });

        assert_eq!(registry.occupied_count(), 0);
    }

    #[test]
    fn test_clear_returns_handles() {
        let registry = ConnectionRegistry::new(3);
        registry.try_occupy(1).unwrap();
        registry.try_occupy(2).unwrap();

        let mut removed = registry.clear();
        removed.sort_unstable();

        assert_eq!(removed, vec![1, 2]);
        assert_eq!(registry.occupied_count(), 0);
        assert_eq!(registry.capacity(), 3);
    }

    #[tokio::test]
    async fn test_vacancy_wakes_on_free() {
        let registry = Arc::new(ConnectionRegistry::new(1));
        let token = registry.try_occupy(()).unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.vacancy().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        registry.free(token);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
