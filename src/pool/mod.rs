use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("pool exhausted: all {capacity} slots are in use")]
    Exhausted { capacity: usize },
    #[error("invalid handle: slot {index} (generation {generation}) is not live")]
    InvalidHandle { index: u32, generation: u32 },
}

pub type PoolResult<T> = Result<T, PoolError>;

// ── Handle ───────────────────────────────────────────────────────────

/// Generation-checked reference to an element of a [`Pool`].
///
/// A handle stays valid until the element is freed. Freeing bumps the slot's
/// generation, so a stale handle never resolves to whatever reuses the slot.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Handle { index, generation, _marker: PhantomData }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    fn invalid(self) -> PoolError {
        PoolError::InvalidHandle { index: self.index, generation: self.generation }
    }
}

// Manual impls: derives would put bounds on T.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// ── Slots ────────────────────────────────────────────────────────────

enum Entry<T> {
    Vacant,
    Occupied(T),
    /// Moved out through `lend`; the handle stays reserved until `restore`.
    Lent,
}

struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

// ── Pool ─────────────────────────────────────────────────────────────

/// Fixed-capacity slab with O(1) alloc/free and LIFO slot reuse.
///
/// Slots are touched lazily: the backing vector only grows up to `capacity`
/// and never beyond it.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Pool { slots: Vec::new(), free: Vec::new(), capacity, live: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live elements, lent ones included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.live >= self.capacity
    }

    pub fn alloc(&mut self, value: T) -> PoolResult<Handle<T>> {
        self.claim(Entry::Occupied(value))
    }

    /// Claims a slot for an element that lives outside the pool.
    ///
    /// The slot starts out lent: it counts as live and is not reused until
    /// [`Pool::release`] (or a [`Pool::restore`] followed by a free).
    pub fn reserve(&mut self) -> PoolResult<Handle<T>> {
        self.claim(Entry::Lent)
    }

    fn claim(&mut self, entry: Entry<T>) -> PoolResult<Handle<T>> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = entry;
            self.live += 1;
            return Ok(Handle::new(index, slot.generation));
        }
        if self.slots.len() >= self.capacity {
            return Err(PoolError::Exhausted { capacity: self.capacity });
        }
        // Handles address slots with 32 bits.
        let index = u32::try_from(self.slots.len()).map_err(|_| PoolError::Exhausted { capacity: self.capacity })?;
        self.slots.push(Slot { generation: 0, entry });
        self.live += 1;
        Ok(Handle::new(index, 0))
    }

    /// Releases the slot and hands the element back to the caller.
    pub fn free(&mut self, handle: Handle<T>) -> PoolResult<T> {
        let slot = self.slot_mut(handle).ok_or_else(|| handle.invalid())?;
        match std::mem::replace(&mut slot.entry, Entry::Vacant) {
            Entry::Occupied(value) => {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
                self.live -= 1;
                Ok(value)
            }
            other => {
                slot.entry = other;
                Err(handle.invalid())
            }
        }
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot { generation, entry: Entry::Occupied(value) }) if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slot_mut(handle) {
            Some(Slot { entry: Entry::Occupied(value), .. }) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Moves the element out while keeping its slot reserved.
    ///
    /// Until [`Pool::restore`] is called the handle resolves to nothing,
    /// cannot be freed, and the slot is not reused.
    pub fn lend(&mut self, handle: Handle<T>) -> PoolResult<T> {
        let slot = self.slot_mut(handle).ok_or_else(|| handle.invalid())?;
        match std::mem::replace(&mut slot.entry, Entry::Lent) {
            Entry::Occupied(value) => Ok(value),
            other => {
                slot.entry = other;
                Err(handle.invalid())
            }
        }
    }

    pub fn restore(&mut self, handle: Handle<T>, value: T) -> PoolResult<()> {
        let slot = self.slot_mut(handle).ok_or_else(|| handle.invalid())?;
        match slot.entry {
            Entry::Lent => {
                slot.entry = Entry::Occupied(value);
                Ok(())
            }
            _ => Err(handle.invalid()),
        }
    }

    /// Frees a lent slot without an element to give back.
    pub fn release(&mut self, handle: Handle<T>) -> PoolResult<()> {
        let slot = self.slot_mut(handle).ok_or_else(|| handle.invalid())?;
        if !matches!(slot.entry, Entry::Lent) {
            return Err(handle.invalid());
        }
        slot.entry = Entry::Vacant;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match &slot.entry {
            Entry::Occupied(value) => Some((Handle::new(i as u32, slot.generation), value)),
            _ => None,
        })
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("live", &self.live)
            .field("touched", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_get() {
        let mut pool = Pool::with_capacity(4);
        let a = pool.alloc(String::from("a")).unwrap();
        let b = pool.alloc(String::from("b")).unwrap();
        assert_eq!(pool.get(a).map(String::as_str), Some("a"));
        assert_eq!(pool.get(b).map(String::as_str), Some("b"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn get_mut_writes_through() {
        let mut pool = Pool::with_capacity(1);
        let h = pool.alloc(1).unwrap();
        *pool.get_mut(h).unwrap() += 41;
        assert_eq!(pool.get(h), Some(&42));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut pool = Pool::with_capacity(2);
        pool.alloc(1).unwrap();
        pool.alloc(2).unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.alloc(3), Err(PoolError::Exhausted { capacity: 2 }));
    }

    #[test]
    fn zero_capacity_never_allocates() {
        let mut pool: Pool<u8> = Pool::with_capacity(0);
        assert!(matches!(pool.alloc(0), Err(PoolError::Exhausted { capacity: 0 })));
    }

    #[test]
    fn freed_slot_is_reused_before_untouched_ones() {
        let mut pool = Pool::with_capacity(3);
        let a = pool.alloc('a').unwrap();
        let _b = pool.alloc('b').unwrap();
        assert_eq!(pool.free(a), Ok('a'));
        let c = pool.alloc('c').unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
    }

    #[test]
    fn reuse_is_lifo() {
        let mut pool = Pool::with_capacity(3);
        let a = pool.alloc(0).unwrap();
        let b = pool.alloc(1).unwrap();
        pool.free(a).unwrap();
        pool.free(b).unwrap();
        assert_eq!(pool.alloc(2).unwrap().index(), b.index());
        assert_eq!(pool.alloc(3).unwrap().index(), a.index());
    }

    #[test]
    fn stale_handle_does_not_resolve() {
        let mut pool = Pool::with_capacity(1);
        let old = pool.alloc(10).unwrap();
        pool.free(old).unwrap();
        let new = pool.alloc(20).unwrap();
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.get(new), Some(&20));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut pool = Pool::with_capacity(1);
        let h = pool.alloc(()).unwrap();
        pool.free(h).unwrap();
        assert!(matches!(pool.free(h), Err(PoolError::InvalidHandle { .. })));
        assert!(pool.is_empty());
    }

    #[test]
    fn lend_and_restore() {
        let mut pool = Pool::with_capacity(2);
        let h = pool.alloc(vec![1, 2]).unwrap();
        let mut v = pool.lend(h).unwrap();
        assert_eq!(pool.get(h), None);
        assert!(pool.free(h).is_err());
        assert!(pool.lend(h).is_err());
        // A lent slot is still counted and still reserved.
        assert_eq!(pool.len(), 1);
        let other = pool.alloc(vec![]).unwrap();
        assert_ne!(other.index(), h.index());

        v.push(3);
        pool.restore(h, v).unwrap();
        assert_eq!(pool.get(h), Some(&vec![1, 2, 3]));
        assert!(pool.restore(h, vec![]).is_err());
    }

    #[test]
    fn reserved_slot_counts_until_released() {
        let mut pool: Pool<String> = Pool::with_capacity(2);
        let r = pool.reserve().unwrap();
        let a = pool.alloc(String::from("a")).unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.get(r), None);
        assert!(pool.free(r).is_err());
        assert!(matches!(pool.alloc(String::new()), Err(PoolError::Exhausted { capacity: 2 })));

        pool.release(r).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.release(r).is_err());
        let again = pool.reserve().unwrap();
        assert_eq!(again.index(), r.index());
        assert_ne!(again, r);
        // Occupied slots are freed, not released.
        assert!(pool.release(a).is_err());
    }

    #[test]
    fn iter_yields_live_elements_only() {
        let mut pool = Pool::with_capacity(4);
        let a = pool.alloc("a").unwrap();
        let b = pool.alloc("b").unwrap();
        let c = pool.alloc("c").unwrap();
        pool.free(b).unwrap();
        let _ = pool.lend(c).unwrap();
        let live: Vec<_> = pool.iter().collect();
        assert_eq!(live, vec![(a, &"a")]);
    }

    #[test]
    fn randomized_round_trip() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let mut pool = Pool::with_capacity(16);
        let mut live: Vec<(Handle<u64>, u64)> = Vec::new();
        for step in 0..2_000u64 {
            let want_alloc = live.is_empty() || (live.len() < 16 && rng.bool());
            if want_alloc {
                let h = pool.alloc(step).unwrap();
                live.push((h, step));
            } else {
                let (h, expected) = live.swap_remove(rng.usize(..live.len()));
                assert_eq!(pool.free(h), Ok(expected));
            }
            for &(h, expected) in &live {
                assert_eq!(pool.get(h), Some(&expected));
            }
            assert_eq!(pool.len(), live.len());
        }
    }
}
