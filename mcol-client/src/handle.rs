//! # Remote Handle Arena
//!
//! Reference-counted handles naming a metric on a remote provider.
//!
//! ## Design Principles
//! 1. **Arena + Free List**: Handles live in a dense `Vec` of slots; freed
//!    slots are recycled through a free list.
//! 2. **Generation Checks**: A `HandleId` carries the generation of the slot it
//!    was issued for. Releasing the last reference bumps the generation, so a
//!    stale id is rejected instead of aliasing a later handle.
//! 3. **Destroy Once**: The entry is dropped exactly when its refcount reaches
//!    zero; nothing else removes it.
//! 4. **Owner Tagging**: Every arena draws a process-unique owner id, and ids
//!    issued by another arena are rejected.
//!
//! ## Structure Overview
//!
//! ```text
//! HandleArena
//!   ├── owner: u64
//!   ├── slots: Vec<Slot>
//!   │     └── Slot { generation, entry: Option<HandleEntry> }
//!   │                                └── HandleEntry { address, provider_id, metric_id, refcount }
//!   ├── free: Vec<u32>
//!   └── open: usize
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use mcol_common::{CollectorError, CollectorResult, MetricId};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Opaque id of a remote handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    owner: u64,
    index: u32,
    generation: u32,
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}v{}", self.owner, self.index, self.generation)
    }
}

/// What a handle names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetric {
    /// Resolved provider address.
    pub address: SocketAddr,
    /// Provider id on that address.
    pub provider_id: u16,
    /// Metric id on that provider.
    pub metric_id: MetricId,
}

#[derive(Debug)]
struct HandleEntry {
    target: RemoteMetric,
    refcount: u64,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<HandleEntry>,
}

/// Slot arena holding every open handle of one endpoint.
#[derive(Debug)]
pub(crate) struct HandleArena {
    owner: u64,
    slots: Vec<Slot>,
    free: Vec<u32>,
    open: usize,
}

impl HandleArena {
    pub(crate) fn new() -> Self {
        HandleArena {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            open: 0,
        }
    }

    /// Stores a new handle with refcount 1.
    pub(crate) fn insert(&mut self, target: RemoteMetric) -> HandleId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(HandleEntry { target, refcount: 1 });
        self.open += 1;
        HandleId {
            owner: self.owner,
            index,
            generation: slot.generation,
        }
    }

    /// Adds one reference and returns the new count.
    pub(crate) fn ref_incr(&mut self, id: HandleId) -> CollectorResult<u64> {
        let entry = self.entry_mut(id)?;
        entry.refcount += 1;
        Ok(entry.refcount)
    }

    /// Drops one reference.
    ///
    /// Returns the destroyed target when the count reached zero.
    pub(crate) fn release(&mut self, id: HandleId) -> CollectorResult<Option<RemoteMetric>> {
        let entry = self.entry_mut(id)?;
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Ok(None);
        }

        let slot = &mut self.slots[id.index as usize];
        let destroyed = slot.entry.take().map(|entry| entry.target);
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.open -= 1;
        Ok(destroyed)
    }

    pub(crate) fn target(&self, id: HandleId) -> CollectorResult<&RemoteMetric> {
        self.entry(id)
            .map(|entry| &entry.target)
            .ok_or(CollectorError::InvalidArgs)
    }

    pub(crate) fn refcount(&self, id: HandleId) -> Option<u64> {
        self.entry(id).map(|entry| entry.refcount)
    }

    /// Number of live handles.
    pub(crate) fn open(&self) -> usize {
        self.open
    }

    fn entry(&self, id: HandleId) -> Option<&HandleEntry> {
        if id.owner != self.owner {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: HandleId) -> CollectorResult<&mut HandleEntry> {
        if id.owner != self.owner {
            return Err(CollectorError::InvalidArgs);
        }
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(CollectorError::InvalidArgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(metric: u32) -> RemoteMetric {
        RemoteMetric {
            address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            provider_id: 42,
            metric_id: MetricId(metric),
        }
    }

    #[test]
    fn lifecycle_counts_references() {
        let mut arena = HandleArena::new();
        let id = arena.insert(target(1));
        assert_eq!(arena.refcount(id), Some(1));
        assert_eq!(arena.ref_incr(id).unwrap(), 2);
        assert_eq!(arena.release(id).unwrap(), None);
        assert_eq!(arena.open(), 1);
        assert_eq!(arena.release(id).unwrap(), Some(target(1)));
        assert_eq!(arena.open(), 0);
    }

    #[test]
    fn destroyed_handle_is_rejected() {
        let mut arena = HandleArena::new();
        let id = arena.insert(target(1));
        arena.release(id).unwrap();
        assert_eq!(arena.release(id), Err(CollectorError::InvalidArgs));
        assert_eq!(arena.ref_incr(id), Err(CollectorError::InvalidArgs));
        assert_eq!(arena.target(id), Err(CollectorError::InvalidArgs));
        assert_eq!(arena.refcount(id), None);
    }

    #[test]
    fn recycled_slot_does_not_alias_stale_id() {
        let mut arena = HandleArena::new();
        let old = arena.insert(target(1));
        arena.release(old).unwrap();

        let new = arena.insert(target(2));
        assert_ne!(old, new);
        assert_eq!(arena.target(new).unwrap().metric_id, MetricId(2));
        assert_eq!(arena.release(old), Err(CollectorError::InvalidArgs));
        assert_eq!(arena.refcount(new), Some(1));
    }

    #[test]
    fn foreign_arena_id_is_rejected() {
        let mut a = HandleArena::new();
        let mut b = HandleArena::new();
        let from_a = a.insert(target(1));
        let from_b = b.insert(target(2));

        assert_eq!(b.release(from_a), Err(CollectorError::InvalidArgs));
        assert_eq!(b.ref_incr(from_a), Err(CollectorError::InvalidArgs));
        assert_eq!(b.target(from_a), Err(CollectorError::InvalidArgs));
        assert_eq!(b.refcount(from_a), None);
        assert_eq!(b.refcount(from_b), Some(1));
        assert_eq!(b.open(), 1);
        assert_eq!(a.refcount(from_a), Some(1));
    }

    #[test]
    fn open_counts_live_handles() {
        let mut arena = HandleArena::new();
        let a = arena.insert(target(1));
        let b = arena.insert(target(2));
        assert_eq!(arena.open(), 2);
        arena.release(a).unwrap();
        assert_eq!(arena.open(), 1);
        arena.release(b).unwrap();
        assert_eq!(arena.open(), 0);
    }
}
