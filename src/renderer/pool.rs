//! Generational slot storage for GPU resources
//!
//! Backends keep every texture, framebuffer, program and mesh in a
//! [`ResourcePool`]. Handles carry a generation counter, so a handle that
//! outlives its resource is rejected instead of aliasing whatever reused the
//! slot. Releasing the same handle twice fails the second time, which is how
//! the backends detect double frees.
//!
//! | Operation | Time Complexity |
//! |-----------|-----------------|
//! | `insert`  | O(1) amortized  |
//! | `remove`  | O(1)            |
//! | `get`     | O(1)            |

/// Slot index plus the generation it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolIndex {
    index: u32,
    generation: u32,
}

impl PoolIndex {
    /// Raw slot number
    #[must_use]
    #[inline]
    pub const fn slot(self) -> u32 {
        self.index
    }

    /// Generation the handle was issued in
    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    /// Next free slot, or `NONE` at the end of the list
    Vacant { generation: u32, next: u32 },
}

/// Slot map with a free list and per-slot generations.
#[derive(Debug)]
pub struct ResourcePool<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    len: usize,
    /// Lifetime counters, never decremented
    inserted: u64,
    removed: u64,
}

impl<T> ResourcePool<T> {
    const NONE: u32 = u32::MAX;

    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: Self::NONE,
            len: 0,
            inserted: 0,
            removed: 0,
        }
    }

    /// Store a value and return its handle
    pub fn insert(&mut self, value: T) -> PoolIndex {
        self.len += 1;
        self.inserted += 1;

        if self.free_head != Self::NONE {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            let (generation, next) = match *slot {
                Slot::Vacant { generation, next } => (generation, next),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            self.free_head = next;
            *slot = Slot::Occupied { generation, value };
            PoolIndex { index, generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            PoolIndex {
                index,
                generation: 0,
            }
        }
    }

    /// Remove a value. Returns `None` for stale or already released handles.
    pub fn remove(&mut self, handle: PoolIndex) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {}
            _ => return None,
        }

        let next_generation = handle.generation.wrapping_add(1);
        let old = std::mem::replace(
            slot,
            Slot::Vacant {
                generation: next_generation,
                next: self.free_head,
            },
        );
        self.free_head = handle.index;
        self.len -= 1;
        self.removed += 1;

        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Borrow a live value
    #[must_use]
    #[inline]
    pub fn get(&self, handle: PoolIndex) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow a live value
    #[inline]
    pub fn get_mut(&mut self, handle: PoolIndex) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Whether the handle still refers to a live value
    #[must_use]
    #[inline]
    pub fn contains(&self, handle: PoolIndex) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the pool holds no live values
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total values ever inserted
    #[must_use]
    pub const fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Total values ever removed
    #[must_use]
    pub const fn removed(&self) -> u64 {
        self.removed
    }

    /// Iterate over live values with their handles
    pub fn iter(&self) -> impl Iterator<Item = (PoolIndex, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    PoolIndex {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut pool = ResourcePool::new();
        let a = pool.insert("a");
        let b = pool.insert("b");

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.remove(b), Some("b"));
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(b));
        assert!(pool.contains(a));
    }

    #[test]
    fn test_double_remove_is_rejected() {
        let mut pool = ResourcePool::new();
        let a = pool.insert(1);

        assert_eq!(pool.remove(a), Some(1));
        assert_eq!(pool.remove(a), None);
        assert_eq!(pool.removed(), 1);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut pool = ResourcePool::new();
        let old = pool.insert(10);
        pool.remove(old);

        let new = pool.insert(20);
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get(new), Some(&20));
        assert_eq!(pool.remove(old), None);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut pool = ResourcePool::new();
        let a = pool.insert('a');
        let _b = pool.insert('b');
        let _c = pool.insert('c');
        pool.remove(a);

        let values: Vec<char> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b', 'c']);
        assert_eq!(pool.inserted(), 3);
    }
}
