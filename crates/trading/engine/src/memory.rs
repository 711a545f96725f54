//! Slot pool backing the order indexes
//!
//! Orders live in a `Vec` of slots; the order-ID and price indexes store
//! slot numbers instead of references. Freed slots are reused LIFO so the
//! pool stops allocating once it has grown to the peak number of live
//! orders.

/// Index into a [`SlotPool`]
pub type SlotId = usize;

#[derive(Debug, Clone)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
    free: Vec<SlotId>,
    live: usize,
}

impl<T> SlotPool<T> {
    /// Pre-allocate room for `capacity` live objects
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> SlotId {
        self.live += 1;
        if let Some(id) = self.free.pop() {
            self.slots[id] = Some(value);
            return id;
        }
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let value = self.slots.get_mut(id)?.take()?;
        self.free.push(id);
        self.live -= 1;
        Some(value)
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id)?.as_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live objects in slot order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|v| (id, v)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
