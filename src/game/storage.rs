//! Index-stable entity storage
//!
//! Slots never move while an entity lives, so a working list of slot
//! indices built at the start of a phase stays valid through the whole
//! phase. Removal tombstones the slot; freed slots are only reused by
//! `insert`, which the world never calls mid-phase for players.

use hashbrown::HashMap;

use crate::game::state::EntityId;

/// Dense slot storage with an id -> slot index
#[derive(Debug, Clone)]
pub struct EntityStore<T> {
    slots: Vec<Option<T>>,
    index: HashMap<EntityId, usize>,
    free: Vec<usize>,
}

impl<T> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Insert under `id`, returning the slot. An existing entity with the
    /// same id is replaced in place.
    pub fn insert(&mut self, id: EntityId, value: T) -> usize {
        if let Some(&slot) = self.index.get(&id) {
            self.slots[slot] = Some(value);
            return slot;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        slot
    }

    /// Tombstone the entity's slot
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.index.remove(&id)?;
        let value = self.slots[slot].take();
        self.free.push(slot);
        value
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.index.get(&id).and_then(|&slot| self.slots[slot].as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.index.get(&id) {
            Some(&slot) => self.slots[slot].as_mut(),
            None => None,
        }
    }

    #[inline]
    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn at(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[inline]
    pub fn at_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Two distinct live slots borrowed mutably at once
    pub fn pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut T, &mut T)> {
        if a == b || a >= self.slots.len() || b >= self.slots.len() {
            return None;
        }
        let (lo, hi, swapped) = if a < b { (a, b, false) } else { (b, a, true) };
        let (left, right) = self.slots.split_at_mut(hi);
        let first = left[lo].as_mut()?;
        let second = right[0].as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live slot indices in slot order
    pub fn slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
